//! The attendance decision loop.
//!
//! Per detected face and wall-clock hour, decide whether to record
//! attendance, suppress a duplicate, and notify — at most once per person
//! per hour, however many frames they appear in. The store result is the
//! arbiter for notification: only a fresh `Marked` fires one, so a record
//! persisted by an earlier process run never triggers a second alert.

use crate::notify::Notifier;
use chrono::{DateTime, Local, Timelike};
use rollcall_core::Identity;
use rollcall_store::{MarkOutcome, RejectReason, Store, StoreError};
use std::collections::HashMap;
use std::time::Duration;

/// Bounded retry for a busy store; after this the frame is given up and
/// the next frame tries again.
const BUSY_RETRIES: usize = 2;
const BUSY_BACKOFF: Duration = Duration::from_millis(100);

/// What the loop decided for one detected face; doubles as the overlay
/// label for the (out-of-tree) UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Face did not resolve to an enrolled identity.
    Unrecognized,
    /// A new attendance record was created and a notification dispatched.
    Marked(String),
    /// This person is already recorded for the current hour.
    /// `announced` is true exactly once per (person, hour), for the
    /// one-time informational event.
    AlreadyMarked { name: String, announced: bool },
    /// The store refused the mark; nothing was recorded.
    Rejected(String, RejectReason),
    /// The store stayed busy through the retry budget; a later frame
    /// will try again.
    StoreBusy(String),
}

/// Per-instance decision state. Constructed empty; the persisted store,
/// not this map, remains the source of truth across restarts.
pub struct DecisionLoop {
    last_marked_hour: HashMap<String, u32>,
    already_notified: HashMap<String, u32>,
}

impl DecisionLoop {
    pub fn new() -> Self {
        Self {
            last_marked_hour: HashMap::new(),
            already_notified: HashMap::new(),
        }
    }

    /// Process one resolved face observation at time `now`.
    pub fn observe(
        &mut self,
        identity: &Identity,
        store: &Store,
        notifier: &dyn Notifier,
        now: DateTime<Local>,
    ) -> Observation {
        let name = match identity {
            Identity::Known { name, .. } => name.as_str(),
            Identity::Unknown { .. } => return Observation::Unrecognized,
        };

        let current_hour = now.hour();
        let today = now.date_naive();

        // Fast path: we already processed this person this hour.
        if self.last_marked_hour.get(name) == Some(&current_hour) {
            let announced = self.already_notified.get(name) != Some(&current_hour);
            if announced {
                tracing::info!(name, hour = current_hour, "attendance already marked this hour");
                self.already_notified.insert(name.to_string(), current_hour);
            }
            return Observation::AlreadyMarked {
                name: name.to_string(),
                announced,
            };
        }

        match mark_with_retry(store, name, today, current_hour) {
            Ok(MarkOutcome::Marked) => {
                self.last_marked_hour.insert(name.to_string(), current_hour);
                self.already_notified.remove(name);
                notifier.notify(name);
                Observation::Marked(name.to_string())
            }
            Ok(MarkOutcome::AlreadyMarked) => {
                // Persisted before this instance saw it (e.g. restart
                // mid-hour). Adopt the fact; do not notify again.
                self.last_marked_hour.insert(name.to_string(), current_hour);
                Observation::AlreadyMarked {
                    name: name.to_string(),
                    announced: false,
                }
            }
            Ok(MarkOutcome::Rejected(reason)) => {
                tracing::warn!(name, ?reason, "attendance mark rejected");
                Observation::Rejected(name.to_string(), reason)
            }
            Err(e) => {
                tracing::warn!(name, error = %e, "store unavailable, deferring to a later frame");
                Observation::StoreBusy(name.to_string())
            }
        }
    }
}

impl Default for DecisionLoop {
    fn default() -> Self {
        Self::new()
    }
}

fn mark_with_retry(
    store: &Store,
    name: &str,
    date: chrono::NaiveDate,
    hour: u32,
) -> Result<MarkOutcome, StoreError> {
    let mut attempt = 0;
    loop {
        match store.mark(name, date, hour) {
            Err(StoreError::Busy) if attempt < BUSY_RETRIES => {
                attempt += 1;
                tracing::debug!(name, attempt, "store busy, backing off");
                std::thread::sleep(BUSY_BACKOFF);
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct CountingNotifier {
        notified: Mutex<Vec<String>>,
    }

    impl CountingNotifier {
        fn new() -> Self {
            Self {
                notified: Mutex::new(Vec::new()),
            }
        }

        fn count_for(&self, name: &str) -> usize {
            self.notified
                .lock()
                .unwrap()
                .iter()
                .filter(|n| n.as_str() == name)
                .count()
        }
    }

    impl Notifier for CountingNotifier {
        fn notify(&self, name: &str) {
            self.notified.lock().unwrap().push(name.to_string());
        }
    }

    fn store_with(names: &[&str]) -> Store {
        let store = Store::open_in_memory().unwrap();
        for name in names {
            store.upsert_contact(name, None, None).unwrap();
        }
        store
    }

    fn at_hour(hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 1, hour, 15, 0).unwrap()
    }

    fn known(name: &str) -> Identity {
        Identity::Known {
            name: name.to_string(),
            distance: 0.3,
        }
    }

    #[test]
    fn test_notify_once_across_many_frames() {
        let store = store_with(&["Alice"]);
        let notifier = CountingNotifier::new();
        let mut decisions = DecisionLoop::new();

        let mut observations = Vec::new();
        for _ in 0..10 {
            observations.push(decisions.observe(&known("Alice"), &store, &notifier, at_hour(9)));
        }

        assert_eq!(notifier.count_for("Alice"), 1);
        assert_eq!(observations[0], Observation::Marked("Alice".into()));
        assert!(observations[1..].iter().all(|o| matches!(
            o,
            Observation::AlreadyMarked { name, .. } if name == "Alice"
        )));
        assert_eq!(store.records().unwrap().len(), 1);
    }

    #[test]
    fn test_already_marked_announced_exactly_once() {
        let store = store_with(&["Alice"]);
        let notifier = CountingNotifier::new();
        let mut decisions = DecisionLoop::new();

        decisions.observe(&known("Alice"), &store, &notifier, at_hour(9));
        let second = decisions.observe(&known("Alice"), &store, &notifier, at_hour(9));
        let third = decisions.observe(&known("Alice"), &store, &notifier, at_hour(9));

        assert_eq!(
            second,
            Observation::AlreadyMarked {
                name: "Alice".into(),
                announced: true
            }
        );
        assert_eq!(
            third,
            Observation::AlreadyMarked {
                name: "Alice".into(),
                announced: false
            }
        );
    }

    #[test]
    fn test_restart_mid_hour_does_not_renotify() {
        let store = store_with(&["Alice"]);
        let now = at_hour(9);
        // A previous process run already recorded this hour.
        store.mark("Alice", now.date_naive(), now.hour()).unwrap();

        let notifier = CountingNotifier::new();
        let mut decisions = DecisionLoop::new(); // fresh in-memory state

        let obs = decisions.observe(&known("Alice"), &store, &notifier, now);
        assert_eq!(
            obs,
            Observation::AlreadyMarked {
                name: "Alice".into(),
                announced: false
            }
        );
        assert_eq!(notifier.count_for("Alice"), 0);
        assert_eq!(store.records().unwrap().len(), 1);
    }

    #[test]
    fn test_hour_rollover_marks_and_notifies_again() {
        let store = store_with(&["Alice"]);
        let notifier = CountingNotifier::new();
        let mut decisions = DecisionLoop::new();

        assert_eq!(
            decisions.observe(&known("Alice"), &store, &notifier, at_hour(9)),
            Observation::Marked("Alice".into())
        );
        // Trigger the announcement so `already_notified` holds hour 9.
        decisions.observe(&known("Alice"), &store, &notifier, at_hour(9));

        assert_eq!(
            decisions.observe(&known("Alice"), &store, &notifier, at_hour(10)),
            Observation::Marked("Alice".into())
        );

        assert_eq!(notifier.count_for("Alice"), 2);
        assert_eq!(store.records().unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_identity_takes_no_action() {
        let store = store_with(&["Alice"]);
        let notifier = CountingNotifier::new();
        let mut decisions = DecisionLoop::new();

        let obs = decisions.observe(
            &Identity::Unknown {
                best_distance: Some(0.9),
            },
            &store,
            &notifier,
            at_hour(9),
        );

        assert_eq!(obs, Observation::Unrecognized);
        assert!(store.records().unwrap().is_empty());
        assert!(notifier.notified.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rejected_leaves_state_untouched() {
        // "Ghost" resolves but has no contact row.
        let store = store_with(&[]);
        let notifier = CountingNotifier::new();
        let mut decisions = DecisionLoop::new();

        for _ in 0..3 {
            // Every frame retries the mark; no in-memory state shortcuts it
            // into the already-marked path.
            assert_eq!(
                decisions.observe(&known("Ghost"), &store, &notifier, at_hour(9)),
                Observation::Rejected("Ghost".into(), RejectReason::UnknownContact)
            );
        }
        assert!(store.records().unwrap().is_empty());
        assert_eq!(notifier.count_for("Ghost"), 0);
    }

    #[test]
    fn test_people_are_tracked_independently() {
        let store = store_with(&["Alice", "Bob"]);
        let notifier = CountingNotifier::new();
        let mut decisions = DecisionLoop::new();

        decisions.observe(&known("Alice"), &store, &notifier, at_hour(9));
        decisions.observe(&known("Bob"), &store, &notifier, at_hour(9));
        decisions.observe(&known("Alice"), &store, &notifier, at_hour(9));

        assert_eq!(notifier.count_for("Alice"), 1);
        assert_eq!(notifier.count_for("Bob"), 1);
        assert_eq!(store.records().unwrap().len(), 2);
    }

    #[test]
    fn test_fresh_instances_are_independent() {
        // Two loops over separate stores do not share dedup state.
        let store_a = store_with(&["Alice"]);
        let store_b = store_with(&["Alice"]);
        let notifier = CountingNotifier::new();
        let mut loop_a = DecisionLoop::new();
        let mut loop_b = DecisionLoop::new();

        assert_eq!(
            loop_a.observe(&known("Alice"), &store_a, &notifier, at_hour(9)),
            Observation::Marked("Alice".into())
        );
        assert_eq!(
            loop_b.observe(&known("Alice"), &store_b, &notifier, at_hour(9)),
            Observation::Marked("Alice".into())
        );
    }
}
