//! # Contracts
//!
//! Frozen interface contracts shared by every shardq crate.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - All engine timestamps are monotonic (`std::time::Instant`)
//! - Durations reported to observers are derived from those checkpoints, never
//!   from wall-clock time

mod config;
mod error;
mod handler;
mod observer;
mod routing;

pub use config::*;
pub use error::*;
pub use handler::*;
pub use observer::*;
pub use routing::*;
