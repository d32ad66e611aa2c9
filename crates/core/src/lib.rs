//! Core business logic for versia-rs.

pub mod services;

pub use services::*;
