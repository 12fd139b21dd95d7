//! Reusable rendezvous barrier.
//!
//! `StepBarrier` blocks exactly `parties` callers until all of them have
//! arrived, then releases the whole group at once and resets for the next
//! round. A generation counter separates rounds so spurious wakeups and
//! early re-arrivals never release a thread from the wrong round.
//!
//! Unlike `std::sync::Barrier`, the barrier can be closed: once the session
//! ends nobody is left to complete a round, so `close()` wakes every waiter
//! and turns all future arrivals into `Arrival::Closed`.
//!
//! A party may also claim the round with `arrive_claiming()`. The leader
//! learns whether anyone claimed it, which the step coordinator uses to
//! decide who advances the world.

use parking_lot::{Condvar, Mutex};

/// Outcome of a single `arrive()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Last party to arrive; its arrival released the round.
    Leader {
        /// Some party in this round arrived with `arrive_claiming()`.
        claimed: bool,
    },
    /// Released together with the rest of the round.
    Follower,
    /// Barrier was closed before this round completed.
    Closed,
}

impl Arrival {
    /// True if the round completed for this caller.
    pub fn is_released(self) -> bool {
        !matches!(self, Arrival::Closed)
    }
}

#[derive(Debug)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    claimed: bool,
    closed: bool,
}

/// Rendezvous point for a fixed number of parties.
#[derive(Debug)]
pub struct StepBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl StepBarrier {
    /// Create a barrier for `parties` participants.
    ///
    /// # Panics
    /// Panics if `parties` is zero.
    pub fn new(parties: usize) -> Self {
        assert!(parties > 0, "StepBarrier requires at least one party");
        Self {
            parties,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
                claimed: false,
                closed: false,
            }),
            released: Condvar::new(),
        }
    }

    /// Block until all parties have arrived for the current round.
    pub fn arrive(&self) -> Arrival {
        self.arrive_inner(false)
    }

    /// Like `arrive()`, but marks the current round as claimed.
    pub fn arrive_claiming(&self) -> Arrival {
        self.arrive_inner(true)
    }

    fn arrive_inner(&self, claim: bool) -> Arrival {
        let mut state = self.state.lock();
        if state.closed {
            return Arrival::Closed;
        }

        let generation = state.generation;
        state.arrived += 1;
        state.claimed |= claim;
        if state.arrived == self.parties {
            let claimed = state.claimed;
            state.arrived = 0;
            state.claimed = false;
            state.generation = generation.wrapping_add(1);
            self.released.notify_all();
            return Arrival::Leader { claimed };
        }

        while state.generation == generation && !state.closed {
            self.released.wait(&mut state);
        }

        // A round that completed before close() still counts as released.
        if state.generation != generation {
            Arrival::Follower
        } else {
            Arrival::Closed
        }
    }

    /// Permanently open the barrier, waking all waiters.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.arrived = 0;
            state.claimed = false;
            self.released.notify_all();
        }
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of parties required to complete a round.
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Number of parties currently blocked in the open round.
    pub fn waiting(&self) -> usize {
        self.state.lock().arrived
    }

    /// Number of completed rounds.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }
}
