//! Unattended keeper for a farming idle game: one WebSocket per account,
//! correlated request/reply on top of it, and a set of polling engines that
//! tend the farm, visit friends, claim task rewards, and sell the harvest.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod session;
pub mod wire;

pub use error::{Error, Result};
