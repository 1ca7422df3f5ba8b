//! # Contracts
//!
//! Shared data structures and traits of the soil monitor.
//! Every other crate depends on this one, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Host wall clock (`received_at`, UTC) orders records and times irrigation sessions
//! - The device clock is carried for diagnostics only and may be skewed or absent

mod alert;
mod blueprint;
mod error;
mod event;
mod store;
mod telemetry;

pub use alert::*;
pub use blueprint::*;
pub use error::*;
pub use event::*;
pub use store::*;
pub use telemetry::*;
