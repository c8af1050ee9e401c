pub mod catalog;
pub mod config;
pub mod error;
pub mod formats;
pub mod handlers;
pub mod query;
pub mod types;

#[cfg(test)]
mod test_support;

pub use catalog::Catalog;
pub use config::Config;
pub use error::{Error, Result};
