#![deny(unused_variables)]

pub mod archive;
pub mod chunker;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod memory;
pub mod state;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
