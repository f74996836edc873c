pub mod assignment;
pub mod scoring;
pub mod transitions;
