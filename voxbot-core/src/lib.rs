// src/lib.rs

pub mod audio;
pub mod config;
pub mod platforms;
pub mod services;
pub mod test_utils;

pub use voxbot_common::error::Error;
pub use voxbot_common::models::GuildContext;
