//! Runtime-tunable echo behavior
//!
//! The echo handler never reads ambient process state directly. Instead it
//! asks a [`BehaviorSource`] for the raw override values on every request and
//! resolves them into an immutable [`Behavior`]. Malformed values fall back to
//! their defaults independently of each other.

pub mod config;
pub mod source;

pub use config::{Behavior, BehaviorError, DELAY_VAR, RESPONSE_SIZE_VAR, STATUS_CODE_VAR};
pub use source::{BehaviorSource, EnvSource, MapSource};
