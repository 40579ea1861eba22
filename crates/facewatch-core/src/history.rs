//! Deduplicated, confidence-gated log of recognition events.

use crate::types::{HistoryEntry, Prediction};
use parking_lot::Mutex;

/// Minimum confidence percentage (exclusive) for a prediction to be logged.
pub const ACCEPT_THRESHOLD_PCT: f32 = 75.0;
/// Number of entries exposed by the history query.
pub const RECENT_LIMIT: usize = 10;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only recognition log shared between the stream loop and
/// request handlers. All access is serialized by an internal lock.
#[derive(Debug, Default)]
pub struct RecognitionHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl RecognitionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log `prediction` if it is confident enough and names a different
    /// identity than the last logged entry. Returns whether it was logged.
    pub fn record(&self, prediction: &Prediction) -> bool {
        let confidence = prediction.confidence_pct();
        if confidence <= ACCEPT_THRESHOLD_PCT {
            return false;
        }

        let mut entries = self.entries.lock();
        if entries
            .last()
            .is_some_and(|last| last.identity == prediction.identity)
        {
            return false;
        }

        // Stamped under the lock so entries stay in time order.
        let entry = HistoryEntry {
            identity: prediction.identity.clone(),
            confidence,
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        };
        tracing::info!(identity = %entry.identity, confidence, "recognition recorded");
        entries.push(entry);
        true
    }

    /// Up to `n` most recent entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<HistoryEntry> {
        let entries = self.entries.lock();
        entries.iter().rev().take(n).cloned().collect()
    }

    /// Total number of logged entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn p(identity: &str, pct: f32) -> Prediction {
        Prediction::new(identity, pct / 100.0)
    }

    fn identities(entries: &[HistoryEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.identity.as_str()).collect()
    }

    #[test]
    fn test_episode_scenario() {
        let history = RecognitionHistory::new();
        let accepted: Vec<bool> = [p("alice", 80.0), p("alice", 82.0), p("bob", 90.0), p("alice", 76.0)]
            .iter()
            .map(|pred| history.record(pred))
            .collect();
        assert_eq!(accepted, vec![true, false, true, true]);

        let mut chronological = history.recent(RECENT_LIMIT);
        chronological.reverse();
        assert_eq!(identities(&chronological), vec!["alice", "bob", "alice"]);
        let confidences: Vec<f32> = chronological.iter().map(|e| e.confidence).collect();
        assert_eq!(confidences, vec![80.0, 90.0, 76.0]);
    }

    #[test]
    fn test_low_confidence_never_recorded() {
        let history = RecognitionHistory::new();
        assert!(history.record(&p("alice", 80.0)));
        assert!(!history.record(&p("bob", 60.0)));
        assert_eq!(identities(&history.recent(RECENT_LIMIT)), vec!["alice"]);
    }

    #[test]
    fn test_threshold_boundary() {
        let history = RecognitionHistory::new();
        assert!(!history.record(&p("alice", 74.9)));
        assert!(!history.record(&p("alice", 75.0)));
        assert!(history.record(&p("alice", 75.1)));
        assert!(history.recent(RECENT_LIMIT).iter().all(|e| e.confidence > ACCEPT_THRESHOLD_PCT));
    }

    #[test]
    fn test_rejected_prediction_does_not_reset_marker() {
        let history = RecognitionHistory::new();
        assert!(history.record(&p("alice", 90.0)));
        // Low-confidence "bob" is not accepted, so the last identity stays "alice".
        assert!(!history.record(&p("bob", 50.0)));
        assert!(!history.record(&p("alice", 95.0)));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_no_consecutive_duplicates() {
        let history = RecognitionHistory::new();
        let names = ["a", "a", "b", "b", "b", "a", "c", "c", "a", "a"];
        let confs = [90.0, 40.0, 76.0, 99.0, 20.0, 80.0, 70.0, 88.0, 91.0, 77.0];
        for (name, conf) in names.iter().zip(confs) {
            history.record(&p(name, conf));
        }
        let entries = history.recent(usize::MAX);
        assert!(entries.windows(2).all(|w| w[0].identity != w[1].identity));
        assert_eq!(identities(&entries), vec!["a", "c", "a", "b", "a"]);
    }

    #[test]
    fn test_recent_is_bounded_and_newest_first() {
        let history = RecognitionHistory::new();
        for i in 0..25 {
            history.record(&p(&format!("person{i}"), 90.0));
        }
        assert_eq!(history.len(), 25);

        let recent = history.recent(RECENT_LIMIT);
        assert_eq!(recent.len(), RECENT_LIMIT);
        let expected: Vec<String> = (15..25).rev().map(|i| format!("person{i}")).collect();
        assert_eq!(recent.iter().map(|e| e.identity.clone()).collect::<Vec<_>>(), expected);
        assert!(recent.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn test_recent_with_fewer_entries() {
        let history = RecognitionHistory::new();
        assert!(history.recent(RECENT_LIMIT).is_empty());
        history.record(&p("alice", 80.0));
        history.record(&p("bob", 80.0));
        assert_eq!(identities(&history.recent(RECENT_LIMIT)), vec!["bob", "alice"]);
    }

    #[test]
    fn test_timestamp_format() {
        let history = RecognitionHistory::new();
        history.record(&p("alice", 80.0));
        let ts = &history.recent(1)[0].timestamp;
        assert!(chrono::NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).is_ok(), "bad timestamp {ts}");
    }

    #[test]
    fn test_concurrent_writers_keep_invariants() {
        let history = Arc::new(RecognitionHistory::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let history = Arc::clone(&history);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let name = if (i + t) % 2 == 0 { "alice" } else { "bob" };
                        history.record(&p(name, 90.0));
                        let _ = history.recent(RECENT_LIMIT);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let entries = history.recent(usize::MAX);
        assert_eq!(entries.len(), history.len());
        assert!(entries.windows(2).all(|w| w[0].identity != w[1].identity));
    }
}
