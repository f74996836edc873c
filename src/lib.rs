pub mod api;
pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod geo;
pub mod hierarchy;
pub mod models;
pub mod observability;
pub mod permission;
pub mod progression;
pub mod state;
pub mod store;
