use std::sync::atomic::{AtomicU64, Ordering};

use crate::tracker::LoadTracker;

/// Returns the next process-wide load item id.
///
/// Ids are unique across all trackers so an aggregate folding items from
/// several children never aliases two of them.
pub(crate) fn next_ticket_id() -> u64 {
	static NEXT: AtomicU64 = AtomicU64::new(0);
	NEXT.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
}

/// Completion handle for one registered load item.
///
/// Completion is exactly-once: [`complete`](Self::complete) consumes the
/// ticket, and dropping an uncompleted ticket completes it as well, so a
/// load task that unwinds or is cancelled still clears its entry. The
/// tracker never inspects the load's output; the ticket carries only the
/// diagnostic name.
pub struct LoadTicket {
	tracker: LoadTracker,
	id: u64,
	name: String,
	done: bool,
}

impl LoadTicket {
	pub(crate) fn new(tracker: LoadTracker, id: u64, name: String) -> Self {
		Self {
			tracker,
			id,
			name,
			done: false,
		}
	}

	/// Item name, for diagnostics.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Process-unique item id.
	pub fn id(&self) -> u64 {
		self.id
	}

	/// Marks the load finished and removes it from the tracker.
	pub fn complete(mut self) {
		self.finish();
	}

	fn finish(&mut self) {
		if self.done {
			return;
		}
		self.done = true;
		self.tracker.complete_item(self.id, &self.name);
	}
}

impl Drop for LoadTicket {
	fn drop(&mut self) {
		self.finish();
	}
}
