//! Core types: errors, configuration, session state.

pub mod config;
pub mod errors;
pub mod session;
