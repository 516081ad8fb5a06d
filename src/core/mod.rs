//! The core module holds the error type and the settings shared by every other module.

pub mod error;
pub mod settings;
