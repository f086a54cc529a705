pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod scrapers;
pub mod service;
pub mod shutdown;
pub mod storage;

pub use error::{Result, ScoutError};
