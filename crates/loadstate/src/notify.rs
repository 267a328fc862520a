use tokio::sync::broadcast;

/// Category of a wait window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitKind {
	/// Interaction should be blocked until the window closes.
	Blocking,
	/// A dismissible secondary indicator; the UI stays usable.
	Nonblocking,
}

impl WaitKind {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Blocking => "blocking",
			Self::Nonblocking => "nonblocking",
		}
	}
}

/// Wait window lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEvent {
	/// A wait window opened.
	Begin(WaitKind),
	/// A wait window closed.
	End(WaitKind),
}

impl WaitEvent {
	/// Returns the window category.
	pub const fn kind(self) -> WaitKind {
		match self {
			Self::Begin(kind) | Self::End(kind) => kind,
		}
	}

	/// Returns `true` for begin notifications.
	pub const fn is_begin(self) -> bool {
		matches!(self, Self::Begin(_))
	}
}

/// Receiver half of a tracker's wait notification channel.
///
/// Delivers events from the moment of subscription onward; a window that
/// opened earlier (notably the build-time blocking window) is observed
/// through [`LoadTracker::snapshot`](crate::LoadTracker::snapshot) instead.
pub type WaitEventReceiver = broadcast::Receiver<WaitEvent>;
