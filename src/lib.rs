pub mod config;
pub mod error;
pub mod fs;
pub mod logger;
pub mod shell;

pub use error::{FatError, Result};
