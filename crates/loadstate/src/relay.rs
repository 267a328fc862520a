//! Child-to-parent relay of load item facts.
//!
//! A child tracker holds at most one parent sink and delivers these events
//! by direct call. The parent folds them into its own active set and never
//! re-forwards them, so relay stops at the first consumer and a
//! grandparent cannot observe a grandchild's items.

/// One relayed load item fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RelayEvent {
	/// A load item began on the child.
	Registered { id: u64, name: String },
	/// A load item settled on the child.
	Completed { id: u64, name: String },
}
