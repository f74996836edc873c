pub mod assignment;
pub mod event;
pub mod progression;
pub mod task;
pub mod worker;
pub mod zone;
