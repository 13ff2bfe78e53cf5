//! Utility functions and helpers.
//!
//! Common utilities for environment variable handling.

pub mod env;

pub use env::{gateway_names_from_env, get_env_with_prefix};
