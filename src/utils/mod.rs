//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `topicq` application.
//!
//! This module centralizes the error taxonomy shared by the broker, transport
//! and client layers, and the logging bootstrap used by the binary and tests.

pub mod error;
pub mod logging;
