//! Core library for CARO
//!
//! This crate contains the data model shared by the session runner and its
//! callers, including:
//! - Session requests and workspace target descriptors
//! - Run records and token usage
//! - The run store (persistence sink)

pub mod error;
pub mod run;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
