//! Per-user gate for on-demand chain backfills.
//!
//! At most one backfill runs per user, and a user is not re-fetched until
//! the cooldown has elapsed since their last fetch started. The in-flight
//! claim is a [`BackfillPermit`] released on drop, so a cancelled request
//! cannot leave a user blocked.

use poc_core::Address;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default cooldown between backfills of the same user.
pub const DEFAULT_BACKFILL_COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Default)]
struct GateState {
    in_flight: HashSet<Address>,
    last_fetch: HashMap<Address, Instant>,
}

/// Tracks in-flight and recent backfills.
pub struct BackfillGate {
    cooldown: Duration,
    state: Arc<Mutex<GateState>>,
}

/// In-flight claim on a user's backfill. Dropping it releases the claim.
#[must_use = "the backfill claim is released when the permit is dropped"]
pub struct BackfillPermit {
    user: Address,
    state: Arc<Mutex<GateState>>,
}

fn lock(state: &Mutex<GateState>) -> MutexGuard<'_, GateState> {
    // The state stays consistent across a panic, so a poisoned lock is usable.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BackfillGate {
    /// Create a gate with the given cooldown.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            state: Arc::new(Mutex::new(GateState::default())),
        }
    }

    /// Claim the right to backfill `user`.
    ///
    /// Returns `None` if a backfill is running or the last one started less
    /// than the cooldown ago.
    pub fn try_begin(&self, user: Address) -> Option<BackfillPermit> {
        self.try_begin_at(user, Instant::now())
    }

    fn try_begin_at(&self, user: Address, now: Instant) -> Option<BackfillPermit> {
        let mut state = lock(&self.state);
        let cooldown = self.cooldown;
        state
            .last_fetch
            .retain(|_, last| now.saturating_duration_since(*last) < cooldown);

        if state.in_flight.contains(&user) || state.last_fetch.contains_key(&user) {
            return None;
        }
        state.in_flight.insert(user);
        state.last_fetch.insert(user, now);
        Some(BackfillPermit {
            user,
            state: Arc::clone(&self.state),
        })
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        lock(&self.state).last_fetch.len()
    }
}

impl Drop for BackfillPermit {
    fn drop(&mut self) {
        lock(&self.state).in_flight.remove(&self.user);
    }
}

impl Default for BackfillGate {
    fn default() -> Self {
        Self::new(DEFAULT_BACKFILL_COOLDOWN)
    }
}
