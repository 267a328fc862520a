//! Loading-state aggregation and wait signaling for asynchronous loads.
//!
//! A [`LoadTracker`] follows a dynamic set of named in-flight load
//! operations and derives its state from that set: `is_loading` while
//! anything is still active, `is_first_item_loaded` once anything has ever
//! finished. Wait windows (blocking for the initial load, non-blocking
//! for loads that start once the UI is already usable) are announced as
//! [`WaitEvent`]s on a broadcast channel for a presentation layer to
//! render.
//!
//! Trackers nest: a child built with [`TrackerSpec::parent`] relays its
//! item lifecycle to one aggregate ancestor, which folds the items into
//! its own active set without re-forwarding them further up.
//!
//! ```no_run
//! use loadstate::TrackerSpec;
//!
//! # async fn demo() -> Result<(), loadstate::TrackerConfigError> {
//! let tracker = TrackerSpec::new("detail-view").wait_for_first_item().build()?;
//! let record = tracker.track("record", fetch_record()).await;
//! # let _ = record;
//! # Ok(())
//! # }
//! # async fn fetch_record() -> u32 { 0 }
//! ```

mod notify;
mod relay;
mod ticket;
mod tracker;

pub use notify::{WaitEvent, WaitEventReceiver, WaitKind};
pub use ticket::LoadTicket;
pub use tracker::{LoadTracker, TrackerConfigError, TrackerSnapshot, TrackerSpec};
