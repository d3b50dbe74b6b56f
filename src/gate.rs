//! Refresh coordination gate enforcing the at-most-one-refresh invariant.
//!
//! The gate is the relay's only piece of shared mutable state: a `Refreshing` flag plus a FIFO
//! queue of continuations. The first caller to [`enter`](RefreshGate::enter) while the gate is
//! idle becomes the refresher and owns the single in-flight refresh call; everyone else is
//! handed a [`QueuedReplay`] that resolves when the refresher settles. Waiters are woken in
//! enqueue order, so replay dispatch is FIFO on a single-threaded executor even though replay
//! completion never is; see [`RefresherSlot::settle`] for the multi-threaded caveat.
//!
//! The gate knows nothing about HTTP or storage; it moves [`RefreshOutcome`] values between
//! tasks, which keeps the Idle/Refreshing state machine unit-testable on its own.

// crates.io
use tokio::sync::oneshot;
// self
use crate::{_prelude::*, session::TokenSecret};

/// Result of a settled refresh attempt, fanned out to every waiting caller.
#[derive(Clone, Debug)]
pub enum RefreshOutcome {
	/// The refresh succeeded; replays must use this access token.
	Rotated(TokenSecret),
	/// The refresh failed; the session is unrecoverable.
	Expired,
}

/// Role assigned to a caller entering the gate.
#[derive(Debug)]
pub enum GatePass {
	/// This caller won the slot and must perform the refresh call, then settle.
	Refresher(RefresherSlot),
	/// A refresh is already in flight; await the queued outcome instead.
	Queued(QueuedReplay),
}

#[derive(Debug, Default)]
struct GateState {
	refreshing: bool,
	queue: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

/// Cycles between `Idle` and `Refreshing` for the lifetime of the session; no terminal state.
#[derive(Clone, Debug, Default)]
pub struct RefreshGate(Arc<Mutex<GateState>>);
impl RefreshGate {
	/// Assigns the caller a role under the gate's lock.
	///
	/// While the gate is `Refreshing`, arriving callers never start their own refresh call;
	/// they join the queue and wait for the in-flight attempt to settle.
	pub fn enter(&self) -> GatePass {
		let mut state = self.0.lock();

		if state.refreshing {
			let (tx, rx) = oneshot::channel();

			state.queue.push_back(tx);

			GatePass::Queued(QueuedReplay(rx))
		} else {
			state.refreshing = true;

			GatePass::Refresher(RefresherSlot { state: Arc::clone(&self.0), settled: false })
		}
	}

	/// Returns `true` while a refresh call is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.0.lock().refreshing
	}

	/// Returns the number of requests currently queued behind the in-flight refresh.
	pub fn queued(&self) -> usize {
		self.0.lock().queue.len()
	}
}

/// Exclusive permission to perform the single in-flight refresh call.
///
/// Dropping the slot without calling [`settle`](RefresherSlot::settle) counts as a failed
/// refresh: the gate returns to idle and every queued waiter observes
/// [`RefreshOutcome::Expired`], so a cancelled refresher cannot wedge the gate.
#[derive(Debug)]
pub struct RefresherSlot {
	state: Arc<Mutex<GateState>>,
	settled: bool,
}
impl RefresherSlot {
	/// Settles the refresh, dispatching `outcome` to every queued waiter in enqueue order.
	///
	/// Dispatch order is wake order: waiters are woken FIFO, but on a multi-threaded executor
	/// the woken tasks may reach their replay sends in a different order. Strict replay-dispatch
	/// ordering additionally requires a single-threaded executor.
	///
	/// Returns the number of waiters dispatched.
	pub fn settle(mut self, outcome: RefreshOutcome) -> usize {
		self.settle_inner(outcome)
	}

	fn settle_inner(&mut self, outcome: RefreshOutcome) -> usize {
		self.settled = true;

		let waiters = {
			let mut state = self.state.lock();

			state.refreshing = false;

			std::mem::take(&mut state.queue)
		};
		let dispatched = waiters.len();

		// Send failures mean the waiter's task is already gone; nothing to deliver.
		for tx in waiters {
			let _ = tx.send(outcome.clone());
		}

		dispatched
	}
}
impl Drop for RefresherSlot {
	fn drop(&mut self) {
		if !self.settled {
			self.settle_inner(RefreshOutcome::Expired);
		}
	}
}

/// A request paused because a refresh was already underway.
#[derive(Debug)]
pub struct QueuedReplay(oneshot::Receiver<RefreshOutcome>);
impl QueuedReplay {
	/// Waits for the in-flight refresh to settle.
	///
	/// A dropped refresher (settled channel without a value) reads as [`RefreshOutcome::Expired`].
	pub async fn outcome(self) -> RefreshOutcome {
		self.0.await.unwrap_or(RefreshOutcome::Expired)
	}
}
