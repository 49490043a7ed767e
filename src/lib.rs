pub mod attendance;
pub mod config;
pub mod data;
