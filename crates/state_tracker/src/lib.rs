//! # State Tracker
//!
//! Derives irrigation start/stop events from the stateless sample stream.
//!
//! The device only reports whether the pump is on right now; sessions and
//! their durations exist only on the host. Timing uses the host arrival
//! clock (`received_at`), never the device clock.
//!
//! ## Usage Example
//!
//! ```ignore
//! use state_tracker::StateTracker;
//!
//! let mut tracker = StateTracker::new();
//! for record in records {
//!     if let Some(event) = tracker.observe(&record) {
//!         store.insert_irrigation_event(&event).await?;
//!     }
//! }
//! ```

mod tracker;

pub use contracts::{IrrigationEvent, IrrigationEventType, Trigger};
pub use tracker::{StateTracker, DEFAULT_DRY_SOIL_THRESHOLD};
