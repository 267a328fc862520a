use std::future::Future;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::notify::{WaitEvent, WaitEventReceiver, WaitKind};
use crate::relay::RelayEvent;
use crate::ticket::{LoadTicket, next_ticket_id};

type FirstItemHook = Arc<dyn Fn() + Send + Sync>;
type LastItemHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Errors rejected at tracker construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TrackerConfigError {
	/// The configured parent sink does not consume relay events.
	#[error("parent tracker `{0}` is not an aggregate")]
	ParentNotAggregate(String),
	/// The wait notification channel needs capacity for at least one event.
	#[error("event buffer capacity must be > 0")]
	ZeroEventBuffer,
}

/// Builder for one load tracker.
pub struct TrackerSpec {
	name: String,
	wait_for_first_item: bool,
	nonblock_additional_items: bool,
	aggregate: bool,
	event_buffer: usize,
	parent: Option<LoadTracker>,
	on_first_item_loaded: Option<FirstItemHook>,
	on_last_item_loaded: Option<LastItemHook>,
}

impl TrackerSpec {
	/// Creates a spec with defaults: no wait windows, not an aggregate.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			wait_for_first_item: false,
			nonblock_additional_items: false,
			aggregate: false,
			event_buffer: 128,
			parent: None,
			on_first_item_loaded: None,
			on_last_item_loaded: None,
		}
	}

	/// Opens a blocking wait window at build time, closed by the first
	/// completion ever observed.
	#[must_use]
	pub fn wait_for_first_item(mut self) -> Self {
		self.wait_for_first_item = true;
		self
	}

	/// Signals loads that start after the first completion with a
	/// non-blocking window instead of blocking the UI again.
	#[must_use]
	pub fn nonblock_additional_items(mut self) -> Self {
		self.nonblock_additional_items = true;
		self
	}

	/// Marks this instance as a relay consumer for child trackers.
	#[must_use]
	pub fn aggregate(mut self) -> Self {
		self.aggregate = true;
		self
	}

	/// Relays locally registered items to `parent`.
	///
	/// The parent must have been built with [`aggregate`](Self::aggregate);
	/// [`build`](Self::build) rejects the spec otherwise.
	#[must_use]
	pub fn parent(mut self, parent: &LoadTracker) -> Self {
		self.parent = Some(parent.clone());
		self
	}

	/// Sets the wait notification buffer capacity.
	#[must_use]
	pub fn event_buffer(mut self, capacity: usize) -> Self {
		self.event_buffer = capacity;
		self
	}

	/// Invoked each time a non-blocking window opens (the UI became
	/// usable while more loads run).
	#[must_use]
	pub fn on_first_item_loaded(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
		self.on_first_item_loaded = Some(Arc::new(hook));
		self
	}

	/// Invoked with the final item's name when a completion empties the
	/// active set while a non-blocking window is open.
	#[must_use]
	pub fn on_last_item_loaded(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
		self.on_last_item_loaded = Some(Arc::new(hook));
		self
	}

	/// Builds the tracker, opening the blocking window when configured.
	pub fn build(self) -> Result<LoadTracker, TrackerConfigError> {
		if self.event_buffer == 0 {
			return Err(TrackerConfigError::ZeroEventBuffer);
		}
		if let Some(parent) = &self.parent {
			if !parent.is_aggregate() {
				return Err(TrackerConfigError::ParentNotAggregate(parent.name().to_string()));
			}
		}

		let (events, _) = broadcast::channel(self.event_buffer);
		let tracker = LoadTracker {
			inner: Arc::new(TrackerInner {
				name: self.name,
				aggregate: self.aggregate,
				nonblock_additional_items: self.nonblock_additional_items,
				state: Mutex::new(TrackerState {
					active: Vec::new(),
					first_item_loaded: false,
					waiting_for_first: false,
					nonblocking_open: false,
				}),
				events,
				wait_cancel: CancellationToken::new(),
				parent: self.parent,
				on_first_item_loaded: self.on_first_item_loaded,
				on_last_item_loaded: self.on_last_item_loaded,
			}),
		};

		if self.wait_for_first_item {
			tracker.open_blocking();
		}
		Ok(tracker)
	}

	/// Builds the tracker and immediately starts tracking one load.
	///
	/// Returns the tracker and a handle resolving to the load's output;
	/// failures surface through the handle, never through the tracker.
	///
	/// # Panics
	///
	/// Panics when called outside a tokio runtime.
	pub fn build_with_load<F>(self, name: impl Into<String>, load: F) -> Result<(LoadTracker, JoinHandle<F::Output>), TrackerConfigError>
	where
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		let tracker = self.build()?;
		let loaded = tracker.spawn_tracked(name, load);
		Ok((tracker, loaded))
	}
}

/// One entry of the active set.
struct ActiveItem {
	id: u64,
	name: String,
}

struct TrackerState {
	active: Vec<ActiveItem>,
	first_item_loaded: bool,
	waiting_for_first: bool,
	nonblocking_open: bool,
}

struct TrackerInner {
	name: String,
	aggregate: bool,
	nonblock_additional_items: bool,
	state: Mutex<TrackerState>,
	events: broadcast::Sender<WaitEvent>,
	wait_cancel: CancellationToken,
	parent: Option<LoadTracker>,
	on_first_item_loaded: Option<FirstItemHook>,
	on_last_item_loaded: Option<LastItemHook>,
}

/// Hook invocation recorded during a transition, run after the state lock
/// is released so a reentrant hook cannot deadlock the tracker.
enum HookCall {
	FirstItem,
	LastItem(String),
}

/// Point-in-time view of one tracker's aggregation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSnapshot {
	pub name: String,
	/// Active item names in registration order.
	pub active: Vec<String>,
	pub is_loading: bool,
	pub is_first_item_loaded: bool,
	/// A blocking wait window is open.
	pub is_waiting: bool,
	/// A non-blocking wait window is open.
	pub is_nonblocking_waiting: bool,
}

/// Tracks a set of named in-flight loads and signals wait windows.
///
/// Handles are cheap clones sharing one aggregation state. All transitions
/// happen synchronously inside [`register`](Self::register), ticket
/// completion, or [`cancel_waiting`](Self::cancel_waiting); wait events
/// are emitted in transition order.
#[derive(Clone)]
pub struct LoadTracker {
	inner: Arc<TrackerInner>,
}

impl std::fmt::Debug for LoadTracker {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LoadTracker")
			.field("name", &self.inner.name)
			.field("aggregate", &self.inner.aggregate)
			.finish_non_exhaustive()
	}
}

impl LoadTracker {
	/// Registers one load item and returns its completion ticket.
	pub fn register(&self, name: impl Into<String>) -> LoadTicket {
		let id = next_ticket_id();
		let name = name.into();
		self.apply_register(id, &name);
		self.forward(RelayEvent::Registered { id, name: name.clone() });
		LoadTicket::new(self.clone(), id, name)
	}

	/// Registers `fut` under `name` and yields its output once settled.
	///
	/// The item is registered before this returns; output and errors pass
	/// through to the awaiter untouched, and bookkeeping runs even when
	/// the returned future is dropped before completion.
	pub fn track<F>(&self, name: impl Into<String>, fut: F) -> impl Future<Output = F::Output>
	where
		F: Future,
	{
		let ticket = self.register(name);
		async move {
			let out = fut.await;
			ticket.complete();
			out
		}
	}

	/// Spawns `fut` on the ambient tokio runtime, tracked under `name`.
	///
	/// Registration happens synchronously before the spawn. Errors and
	/// panics surface through the returned handle while the item is still
	/// cleared.
	///
	/// # Panics
	///
	/// Panics when called outside a tokio runtime.
	pub fn spawn_tracked<F>(&self, name: impl Into<String>, fut: F) -> JoinHandle<F::Output>
	where
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		let ticket = self.register(name);
		tokio::spawn(async move {
			let out = fut.await;
			ticket.complete();
			out
		})
	}

	/// Subscribes to wait window notifications.
	pub fn subscribe(&self) -> WaitEventReceiver {
		self.inner.events.subscribe()
	}

	/// Closes any open wait window and suppresses auto-opened windows for
	/// the rest of this tracker's life. Idempotent; the active set and
	/// the in-flight loads themselves are untouched.
	pub fn cancel_waiting(&self) {
		self.inner.wait_cancel.cancel();
		let Ok(mut state) = self.inner.state.lock() else {
			return;
		};
		if state.nonblocking_open {
			state.nonblocking_open = false;
			self.emit_end(WaitKind::Nonblocking);
		}
		if state.waiting_for_first {
			state.waiting_for_first = false;
			self.emit_end(WaitKind::Blocking);
		}
		drop(state);
		tracing::debug!(tracker = %self.inner.name, "load.wait.cancel");
	}

	/// Tracker name.
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Returns whether this instance consumes child relay events.
	pub fn is_aggregate(&self) -> bool {
		self.inner.aggregate
	}

	/// Returns `true` while any load item is active.
	pub fn is_loading(&self) -> bool {
		self.inner.state.lock().map(|state| !state.active.is_empty()).unwrap_or(false)
	}

	/// Returns `true` once any item has ever completed. Never reverts.
	pub fn is_first_item_loaded(&self) -> bool {
		self.inner.state.lock().map(|state| state.first_item_loaded).unwrap_or(false)
	}

	/// Returns `true` while a blocking wait window is open.
	pub fn is_waiting(&self) -> bool {
		self.inner.state.lock().map(|state| state.waiting_for_first).unwrap_or(false)
	}

	/// Returns `true` while a non-blocking wait window is open.
	pub fn is_nonblocking_waiting(&self) -> bool {
		self.inner.state.lock().map(|state| state.nonblocking_open).unwrap_or(false)
	}

	/// Returns `true` once [`cancel_waiting`](Self::cancel_waiting) has run.
	pub fn is_wait_cancelled(&self) -> bool {
		self.inner.wait_cancel.is_cancelled()
	}

	/// Resolves once [`cancel_waiting`](Self::cancel_waiting) has run.
	pub async fn wait_cancelled(&self) {
		self.inner.wait_cancel.cancelled().await;
	}

	/// Returns active item names in registration order.
	pub fn active_items(&self) -> Vec<String> {
		let Ok(state) = self.inner.state.lock() else {
			return Vec::new();
		};
		state.active.iter().map(|item| item.name.clone()).collect()
	}

	/// Returns a point-in-time state snapshot.
	pub fn snapshot(&self) -> TrackerSnapshot {
		let Ok(state) = self.inner.state.lock() else {
			return TrackerSnapshot {
				name: self.inner.name.clone(),
				active: Vec::new(),
				is_loading: false,
				is_first_item_loaded: false,
				is_waiting: false,
				is_nonblocking_waiting: false,
			};
		};
		TrackerSnapshot {
			name: self.inner.name.clone(),
			active: state.active.iter().map(|item| item.name.clone()).collect(),
			is_loading: !state.active.is_empty(),
			is_first_item_loaded: state.first_item_loaded,
			is_waiting: state.waiting_for_first,
			is_nonblocking_waiting: state.nonblocking_open,
		}
	}

	/// Removes one item. Called by [`LoadTicket`] exactly once per item.
	pub(crate) fn complete_item(&self, id: u64, name: &str) {
		self.apply_complete(id, name);
		self.forward(RelayEvent::Completed {
			id,
			name: name.to_string(),
		});
	}

	/// Folds one registration into the local active set.
	///
	/// When the set is empty, the first item has ever loaded, non-blocking
	/// mode is configured and no window is open, a non-blocking window
	/// opens before the item is added.
	fn apply_register(&self, id: u64, name: &str) {
		let mut hooks = Vec::new();
		{
			let Ok(mut state) = self.inner.state.lock() else {
				return;
			};
			if state.active.iter().any(|item| item.id == id) {
				tracing::trace!(tracker = %self.inner.name, item = name, "load.item.duplicate");
				return;
			}
			if state.active.is_empty() && state.first_item_loaded && self.nonblock_enabled() && !state.nonblocking_open {
				self.open_nonblocking(&mut state, &mut hooks);
			}
			state.active.push(ActiveItem {
				id,
				name: name.to_string(),
			});
			tracing::trace!(tracker = %self.inner.name, item = name, pending = state.active.len(), "load.item.register");
		}
		self.run_hooks(hooks);
	}

	/// Folds one completion into the local active set.
	///
	/// Completing an item that is not active is a no-op: no notification,
	/// no flag change. Tolerates relay ordering quirks between parent and
	/// child trackers.
	fn apply_complete(&self, id: u64, name: &str) {
		let mut hooks = Vec::new();
		{
			let Ok(mut state) = self.inner.state.lock() else {
				return;
			};
			let Some(pos) = state.active.iter().position(|item| item.id == id) else {
				tracing::trace!(tracker = %self.inner.name, item = name, "load.item.unknown");
				return;
			};
			state.active.remove(pos);
			tracing::trace!(tracker = %self.inner.name, item = name, pending = state.active.len(), "load.item.complete");

			if state.active.is_empty() && state.nonblocking_open {
				state.nonblocking_open = false;
				self.emit_end(WaitKind::Nonblocking);
				hooks.push(HookCall::LastItem(name.to_string()));
			}
			if !state.first_item_loaded {
				state.first_item_loaded = true;
				if state.waiting_for_first {
					state.waiting_for_first = false;
					self.emit_end(WaitKind::Blocking);
				}
			}
			// First completion with secondary loads still in flight: the
			// remainder is signalled non-blocking.
			if !state.active.is_empty() && self.nonblock_enabled() && !state.nonblocking_open {
				self.open_nonblocking(&mut state, &mut hooks);
			}
		}
		self.run_hooks(hooks);
	}

	/// Opens the build-time blocking window.
	fn open_blocking(&self) {
		let Ok(mut state) = self.inner.state.lock() else {
			return;
		};
		state.waiting_for_first = true;
		let _ = self.inner.events.send(WaitEvent::Begin(WaitKind::Blocking));
		tracing::debug!(tracker = %self.inner.name, kind = WaitKind::Blocking.as_str(), "load.wait.begin");
	}

	/// Opens the non-blocking window. Caller holds the state lock and has
	/// checked that the window is closed.
	fn open_nonblocking(&self, state: &mut TrackerState, hooks: &mut Vec<HookCall>) {
		state.nonblocking_open = true;
		let _ = self.inner.events.send(WaitEvent::Begin(WaitKind::Nonblocking));
		tracing::debug!(tracker = %self.inner.name, kind = WaitKind::Nonblocking.as_str(), "load.wait.begin");
		hooks.push(HookCall::FirstItem);
	}

	/// Emits one end-wait notification. Caller holds the state lock.
	fn emit_end(&self, kind: WaitKind) {
		let _ = self.inner.events.send(WaitEvent::End(kind));
		tracing::debug!(tracker = %self.inner.name, kind = kind.as_str(), "load.wait.end");
	}

	fn nonblock_enabled(&self) -> bool {
		self.inner.nonblock_additional_items && !self.inner.wait_cancel.is_cancelled()
	}

	/// Forwards one locally produced relay event to the parent sink.
	///
	/// Only local items are forwarded; events folded from a child are
	/// consumed here and never travel another hop.
	fn forward(&self, event: RelayEvent) {
		let Some(parent) = &self.inner.parent else {
			return;
		};
		tracing::trace!(tracker = %self.inner.name, parent = %parent.name(), "load.relay.forward");
		match event {
			RelayEvent::Registered { id, name } => parent.apply_register(id, &name),
			RelayEvent::Completed { id, name } => parent.apply_complete(id, &name),
		}
	}

	/// Runs transition hooks outside the state lock, in transition order.
	fn run_hooks(&self, hooks: Vec<HookCall>) {
		for call in hooks {
			match call {
				HookCall::FirstItem => {
					if let Some(hook) = &self.inner.on_first_item_loaded {
						hook();
					}
				}
				HookCall::LastItem(name) => {
					if let Some(hook) = &self.inner.on_last_item_loaded {
						hook(&name);
					}
				}
			}
		}
	}
}
