//! Pure admission state for a single resource. Every grant/deny/enqueue
//! decision is made here, synchronously; the actor in `scheduler.rs` owns
//! one `ResourceState` and moves the answers over channels.

use std::collections::VecDeque;

use crate::compat::ModeMatrix;
use crate::types::{LockMode, ResourceKind, ResourceName};

/// A grant as the resource tracks it.
#[derive(Debug, Clone)]
pub struct Holder {
    pub session: String,
    pub mode: LockMode,
    pub quantity: u64,
    /// Sequence kinds only: the element value handed out
    pub element: Option<u64>,
    /// True while a transactional-sequence grant is uncommitted; an
    /// abandoned holder with this set returns its element to the pool
    pub rollback: bool,
}

/// A queued request, granted strictly from the head.
#[derive(Debug, Clone)]
struct Waiter {
    session: String,
    mode: LockMode,
    quantity: u64,
}

/// Outcome of an admission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    /// Granted immediately; sequence kinds carry the element value
    Granted { element: Option<u64> },
    /// Incompatible right now; the caller may enqueue
    Wait,
    /// Can never be satisfied: numeric quantity above the resource total
    Impossible,
}

/// A waiter woken by a release sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regrant {
    pub session: String,
    pub element: Option<u64>,
}

/// Outcome of an explicit unlock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOutcome {
    /// False when the session held nothing here
    pub released: bool,
    /// Rollback was requested on a kind that cannot honor it; the release
    /// itself still happened
    pub not_transactional: bool,
    /// Waiters granted by the post-release sweep
    pub granted: Vec<Regrant>,
}

/// Holder set, wait queue, and (for sequence kinds) the element pool of one
/// resource.
#[derive(Debug)]
pub struct ResourceState {
    name: ResourceName,
    holders: Vec<Holder>,
    waiters: VecDeque<Waiter>,
    /// Sequence cursor; starts at 1, value 0 is never issued
    next_value: u64,
    /// Rolled-back elements, reissued oldest-first before the cursor
    rolled_back: VecDeque<u64>,
}

impl ResourceState {
    pub fn new(name: ResourceName) -> Self {
        Self {
            name,
            holders: Vec::new(),
            waiters: VecDeque::new(),
            next_value: 1,
            rolled_back: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    pub fn holder_count(&self) -> usize {
        self.holders.len()
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_idle(&self) -> bool {
        self.holders.is_empty() && self.waiters.is_empty()
    }

    pub fn holds(&self, session: &str) -> bool {
        self.holders.iter().any(|h| h.session == session)
    }

    /// Element held by a session, for sequence kinds
    pub fn held_element(&self, session: &str) -> Option<u64> {
        self.holders
            .iter()
            .find(|h| h.session == session)
            .and_then(|h| h.element)
    }

    /// Units currently booked on a numeric resource
    fn booked(&self) -> u64 {
        self.holders.iter().map(|h| h.quantity).sum()
    }

    /// Attempts an immediate grant. `Wait` leaves the state untouched; the
    /// caller decides whether to [`enqueue`](Self::enqueue).
    pub fn try_acquire(&mut self, session: &str, mode: LockMode, quantity: u64) -> Acquire {
        match self.name.kind() {
            ResourceKind::Numeric if quantity > self.name.total_quantity() => {
                return Acquire::Impossible;
            }
            _ => {}
        }
        if !self.admissible(mode, quantity) {
            return Acquire::Wait;
        }
        let element = self.grant(session, mode, quantity);
        Acquire::Granted { element }
    }

    /// Whether a fresh request can be granted without jumping the queue. A
    /// queued waiter blocks every newcomer it is incompatible with; mutually
    /// compatible mode requests may still pass each other.
    fn admissible(&self, mode: LockMode, quantity: u64) -> bool {
        match self.name.kind() {
            ResourceKind::Simple => {
                ModeMatrix::admissible(self.holders.iter().map(|h| h.mode), mode)
                    && self
                        .waiters
                        .iter()
                        .all(|w| ModeMatrix::compatible(w.mode, mode))
            }
            ResourceKind::Numeric => self.waiters.is_empty() && self.fits(quantity),
            ResourceKind::Sequence | ResourceKind::TransactionalSequence => {
                self.waiters.is_empty() && self.has_free_slot()
            }
        }
    }

    /// Like [`admissible`](Self::admissible) but for the queue head, which
    /// by definition cannot jump anyone.
    fn grantable_at_head(&self, mode: LockMode, quantity: u64) -> bool {
        match self.name.kind() {
            ResourceKind::Simple => {
                ModeMatrix::admissible(self.holders.iter().map(|h| h.mode), mode)
            }
            ResourceKind::Numeric => self.fits(quantity),
            ResourceKind::Sequence | ResourceKind::TransactionalSequence => self.has_free_slot(),
        }
    }

    fn fits(&self, quantity: u64) -> bool {
        // booked + quantity must not wrap when the total sits at u64::MAX
        self.booked()
            .checked_add(quantity)
            .is_some_and(|sum| sum <= self.name.total_quantity())
    }

    fn has_free_slot(&self) -> bool {
        (self.holders.len() as u64) < self.name.total_quantity()
    }

    /// Records the grant and, for sequence kinds, assigns the element
    fn grant(&mut self, session: &str, mode: LockMode, quantity: u64) -> Option<u64> {
        let kind = self.name.kind();
        let element = kind.sequential().then(|| self.next_element());
        self.holders.push(Holder {
            session: session.to_string(),
            mode,
            quantity,
            element,
            rollback: kind.transactional(),
        });
        element
    }

    /// Pops the oldest rolled-back value, else advances the cursor
    fn next_element(&mut self) -> u64 {
        if let Some(v) = self.rolled_back.pop_front() {
            return v;
        }
        let v = self.next_value;
        self.next_value = self.next_value.wrapping_add(1);
        if self.next_value == 0 {
            self.next_value = 1;
        }
        v
    }

    /// Appends a request to the wait queue
    pub fn enqueue(&mut self, session: &str, mode: LockMode, quantity: u64) {
        self.waiters.push_back(Waiter {
            session: session.to_string(),
            mode,
            quantity,
        });
    }

    /// Removes a queued request; returns false when the session was not
    /// waiting (its grant may have raced the cancellation)
    pub fn cancel_waiter(&mut self, session: &str) -> bool {
        let before = self.waiters.len();
        self.waiters.retain(|w| w.session != session);
        self.waiters.len() != before
    }

    /// Explicit unlock. Transactional rollback pushes the element back onto
    /// the pool; rollback on any other kind completes the release and flags
    /// the warning.
    pub fn release(&mut self, session: &str, rollback: bool) -> ReleaseOutcome {
        let Some(idx) = self.holders.iter().position(|h| h.session == session) else {
            return ReleaseOutcome {
                released: false,
                not_transactional: false,
                granted: Vec::new(),
            };
        };
        let holder = self.holders.remove(idx);
        let transactional = self.name.kind().transactional();
        if rollback && transactional {
            if let Some(v) = holder.element {
                self.rolled_back.push_back(v);
            }
        }
        ReleaseOutcome {
            released: true,
            not_transactional: rollback && !transactional,
            granted: self.sweep(),
        }
    }

    /// Connection-loss cleanup: forgets any wait entry and releases any
    /// grant. An uncommitted transactional grant rolls back.
    pub fn drop_session(&mut self, session: &str) -> Vec<Regrant> {
        self.waiters.retain(|w| w.session != session);
        let Some(idx) = self.holders.iter().position(|h| h.session == session) else {
            return Vec::new();
        };
        let holder = self.holders.remove(idx);
        if holder.rollback {
            if let Some(v) = holder.element {
                self.rolled_back.push_back(v);
            }
        }
        self.sweep()
    }

    /// Grants from the queue head while the head fits; the first waiter
    /// that does not fit stops the sweep, so nobody jumps it.
    fn sweep(&mut self) -> Vec<Regrant> {
        let mut granted = Vec::new();
        while let Some(w) = self.waiters.front() {
            if !self.grantable_at_head(w.mode, w.quantity) {
                break;
            }
            let Some(w) = self.waiters.pop_front() else { break };
            let element = self.grant(&w.session, w.mode, w.quantity);
            granted.push(Regrant {
                session: w.session,
                element,
            });
        }
        granted
    }
}
