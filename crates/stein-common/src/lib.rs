//! # stein-common
//!
//! Shared types for the Stein container daemon:
//! - Error types used across all Stein crates
//! - Textual value codecs for the property interface
//! - Linux capability sets and bounding arithmetic
//! - User credentials and name resolution
//! - Daemon configuration tunables

#![warn(missing_docs)]

pub mod caps;
pub mod config;
pub mod cred;
pub mod error;
pub mod value;

pub use caps::Capabilities;
pub use config::DaemonConfig;
pub use cred::{Cred, UserDb};
pub use error::{SteinError, SteinResult};
