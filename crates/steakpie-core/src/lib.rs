pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod executor;
pub mod runner;
pub mod store;

pub use error::{CoreError, Result};
