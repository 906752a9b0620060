//! Domain layer for the privflow workflow engine
//!
//! This module contains the core models, errors and the port traits that
//! storage and delivery adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
