pub mod badges;
pub mod points;
pub mod requirements;
pub mod stats;
pub mod sweeper;
pub mod upgrade;
