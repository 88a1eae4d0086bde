mod client;

pub mod inverter;
pub mod sems;
pub mod solar;
pub mod tibber;
