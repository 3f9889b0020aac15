pub mod accumulator;
pub mod client;
pub mod config;
pub mod error;
pub mod formatter;
pub mod image;
pub mod models;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod translate;

pub use error::{Error, Result};
