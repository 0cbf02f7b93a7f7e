//! Connection attempt tracking
//!
//! - [`AttemptRegistry`]: the churn driver's set of outstanding attempts.
//!   Attempts enter as `Pending` and leave on abort or failure.
//! - [`SubscriberPool`]: the benchmark's fixed set of N subscribers whose
//!   states only ever move forward.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Attempt ordinal, unique within one registry or pool
pub type AttemptId = u64;

/// Lifecycle of one outbound subscribe request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Connected,
    Aborted,
    Failed,
}

impl AttemptState {
    /// Whether `self -> next` is a legal forward step
    pub fn can_transition_to(self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Pending, Connected) | (Pending, Failed) | (Connected, Aborted) | (Connected, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Aborted | AttemptState::Failed)
    }
}

/// One outbound subscribe request
#[derive(Debug, Clone)]
pub struct ConnectionAttempt {
    pub id: AttemptId,
    pub state: AttemptState,
    pub opened_at: Instant,
}

impl ConnectionAttempt {
    pub fn new(id: AttemptId) -> Self {
        Self {
            id,
            state: AttemptState::Pending,
            opened_at: Instant::now(),
        }
    }

    /// Time since the request was issued
    pub fn elapsed(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Move to `next` if the step is legal; returns whether it moved
    pub fn advance(&mut self, next: AttemptState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }
}

/// Outstanding churn attempts, keyed by id
#[derive(Debug, Default)]
pub struct AttemptRegistry {
    next_id: AtomicU64,
    attempts: DashMap<AttemptId, ConnectionAttempt>,
}

impl AttemptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending attempt
    pub fn open(&self) -> AttemptId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.attempts.insert(id, ConnectionAttempt::new(id));
        id
    }

    /// Mark an attempt as having seen the welcome marker.
    ///
    /// Returns `true` only for the first call on a pending attempt, so a
    /// connection can never be counted twice.
    pub fn mark_connected(&self, id: AttemptId) -> bool {
        self.attempts
            .get_mut(&id)
            .map(|mut attempt| attempt.advance(AttemptState::Connected))
            .unwrap_or(false)
    }

    /// Finish an attempt and drop it from the registry
    pub fn release(&self, id: AttemptId, outcome: AttemptState) -> Option<ConnectionAttempt> {
        debug_assert!(outcome.is_terminal());
        let (_, mut attempt) = self.attempts.remove(&id)?;
        if !attempt.advance(outcome) {
            // Pending attempts can only fail, never abort
            attempt.state = AttemptState::Failed;
        }
        Some(attempt)
    }

    pub fn state(&self, id: AttemptId) -> Option<AttemptState> {
        self.attempts.get(&id).map(|a| a.state)
    }

    /// Attempts issued and not yet released
    pub fn in_flight(&self) -> usize {
        self.attempts.len()
    }

    /// Attempts ever issued
    pub fn opened(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }
}

/// Fixed-size set of persistent subscribers for the throughput benchmark
#[derive(Debug)]
pub struct SubscriberPool {
    members: Vec<Mutex<ConnectionAttempt>>,
}

impl SubscriberPool {
    pub fn new(size: usize) -> Self {
        Self {
            members: (0..size as AttemptId)
                .map(|id| Mutex::new(ConnectionAttempt::new(id)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Record a member's welcome; `true` only on its first one
    pub fn mark_connected(&self, id: AttemptId) -> bool {
        self.advance(id, AttemptState::Connected)
    }

    /// Record that a member could not connect
    pub fn mark_failed(&self, id: AttemptId) -> bool {
        self.advance(id, AttemptState::Failed)
    }

    fn advance(&self, id: AttemptId, next: AttemptState) -> bool {
        self.members
            .get(id as usize)
            .map(|m| m.lock().advance(next))
            .unwrap_or(false)
    }

    pub fn state(&self, id: AttemptId) -> Option<AttemptState> {
        self.members.get(id as usize).map(|m| m.lock().state)
    }

    pub fn count(&self, state: AttemptState) -> usize {
        self.members
            .iter()
            .filter(|m| m.lock().state == state)
            .count()
    }
}
