//! Common traits and test helpers used across the httpecho library
//!
//! This module contains the core traits that define the interface
//! for echo servers and clients.

pub mod test_utils;
pub mod traits;

pub use test_utils::{spawn_test_server, spawn_test_server_with_config};
pub use traits::{EchoClient, EchoServerTrait};
