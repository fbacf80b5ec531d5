// ABOUTME: Profile module - configuration and resolution of named module sets,
// ABOUTME: the switching manager, and profile recommendation.

mod config;
mod manager;
mod recommend;

pub use config::*;
pub use manager::*;
pub use recommend::*;
