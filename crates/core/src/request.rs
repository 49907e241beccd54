//! Request tickets and cancellation.
//!
//! Each state machine issues a ticket per dispatch. Only the latest ticket may
//! apply its result; a completion carrying any older ticket is stale and must
//! be dropped. Issuing a new ticket, or invalidating, cancels the token of the
//! request it replaces.

use serde::Serialize;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Identifies one dispatched request within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RequestTicket(u64);

impl RequestTicket {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a settled request changed session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Applied,
    /// The ticket was superseded, or the session was reset or closed.
    Discarded,
}

/// Issues tickets and tracks the one request allowed to apply.
#[derive(Debug, Default)]
pub struct RequestTracker {
    last_issued: u64,
    in_flight: Option<(RequestTicket, CancellationToken)>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the next ticket, cancelling whatever request was in flight.
    pub fn issue(&mut self) -> (RequestTicket, CancellationToken) {
        self.cancel_in_flight();
        self.last_issued += 1;
        let ticket = RequestTicket(self.last_issued);
        let token = CancellationToken::new();
        self.in_flight = Some((ticket, token.clone()));
        (ticket, token)
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        matches!(&self.in_flight, Some((current, _)) if *current == ticket)
    }

    pub fn in_flight(&self) -> Option<RequestTicket> {
        self.in_flight.as_ref().map(|(ticket, _)| *ticket)
    }

    /// Marks `ticket` finished. Returns `false` when the ticket is stale.
    pub fn settle(&mut self, ticket: RequestTicket) -> bool {
        if self.is_current(ticket) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }

    /// Cancels the in-flight request; its completion will be stale.
    pub fn invalidate(&mut self) -> Option<RequestTicket> {
        let cancelled = self.in_flight();
        self.cancel_in_flight();
        cancelled
    }

    fn cancel_in_flight(&mut self) {
        if let Some((_, token)) = self.in_flight.take() {
            token.cancel();
        }
    }
}

impl Drop for RequestTracker {
    fn drop(&mut self) {
        self.cancel_in_flight();
    }
}

/// Implemented by state machines that can give up on a dispatched request.
pub(crate) trait Abandon {
    /// Returns the machine to a settled state without applying any result.
    fn abandon(&mut self, ticket: RequestTicket);
}

/// Holds a state machine while its request is awaited.
///
/// If the awaiting future is dropped before [`InFlight::finish`] runs, the
/// machine abandons the ticket instead of staying in flight.
pub(crate) struct InFlight<'a, S: Abandon> {
    owner: &'a mut S,
    ticket: RequestTicket,
    armed: bool,
}

impl<'a, S: Abandon> InFlight<'a, S> {
    pub(crate) fn new(owner: &'a mut S, ticket: RequestTicket) -> Self {
        Self {
            owner,
            ticket,
            armed: true,
        }
    }

    pub(crate) fn finish<R>(mut self, apply: impl FnOnce(&mut S, RequestTicket) -> R) -> R {
        self.armed = false;
        apply(&mut *self.owner, self.ticket)
    }
}

impl<S: Abandon> Drop for InFlight<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            self.owner.abandon(self.ticket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tickets_increase_and_supersede() {
        let mut tracker = RequestTracker::new();
        let (first, first_token) = tracker.issue();
        let (second, second_token) = tracker.issue();

        assert!(second > first);
        assert!(first_token.is_cancelled());
        assert!(!second_token.is_cancelled());
        assert!(!tracker.is_current(first));
        assert!(tracker.is_current(second));

        assert!(!tracker.settle(first));
        assert!(tracker.settle(second));
        assert_eq!(tracker.in_flight(), None);
        assert!(!second_token.is_cancelled());
    }

    #[test]
    fn test_invalidate_cancels_and_staleness_follows() {
        let mut tracker = RequestTracker::new();
        let (ticket, token) = tracker.issue();
        assert_eq!(tracker.invalidate(), Some(ticket));
        assert!(token.is_cancelled());
        assert!(!tracker.settle(ticket));
        assert_eq!(tracker.invalidate(), None);
    }

    #[test]
    fn test_drop_cancels_in_flight() {
        let token = {
            let mut tracker = RequestTracker::new();
            tracker.issue().1
        };
        assert!(token.is_cancelled());
    }

    struct Recorder {
        tracker: RequestTracker,
        abandoned: Vec<RequestTicket>,
    }

    impl Abandon for Recorder {
        fn abandon(&mut self, ticket: RequestTicket) {
            self.tracker.settle(ticket);
            self.abandoned.push(ticket);
        }
    }

    #[test]
    fn test_guard_abandons_only_when_dropped_armed() {
        let mut recorder = Recorder {
            tracker: RequestTracker::new(),
            abandoned: Vec::new(),
        };

        let (ticket, _) = recorder.tracker.issue();
        drop(InFlight::new(&mut recorder, ticket));
        assert_eq!(recorder.abandoned, vec![ticket]);
        assert_eq!(recorder.tracker.in_flight(), None);

        let (ticket, _) = recorder.tracker.issue();
        let settled = InFlight::new(&mut recorder, ticket).finish(|r, t| r.tracker.settle(t));
        assert!(settled);
        assert_eq!(recorder.abandoned.len(), 1);
    }
}
