//! Route history of completed state changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use uuid::Uuid;

/// Record of a single completed state change.
///
/// `transition` is `None` for administrative jumps (including the initial
/// state entry), which bypass the transition graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    /// The state being left, `None` for the very first entry.
    pub from: Option<String>,
    /// The state being entered
    pub to: String,
    pub transition: Option<String>,
    pub trigger: Option<String>,
    /// The trip that caused this change
    pub trip_id: Uuid,
    /// When the change completed
    pub timestamp: DateTime<Utc>,
}

/// Bounded, ordered history of state changes.
///
/// Once `limit` records are held, the oldest record is discarded for each
/// new one. A limit of zero keeps everything.
///
/// # Example
///
/// ```rust
/// use turnstile::core::{RouteHistory, RouteRecord};
/// use chrono::Utc;
/// use uuid::Uuid;
///
/// let mut history = RouteHistory::with_limit(0);
/// history.record(RouteRecord {
///     from: None,
///     to: "Idle".into(),
///     transition: None,
///     trigger: None,
///     trip_id: Uuid::new_v4(),
///     timestamp: Utc::now(),
/// });
/// history.record(RouteRecord {
///     from: Some("Idle".into()),
///     to: "Running".into(),
///     transition: Some("Idle->Running".into()),
///     trigger: None,
///     trip_id: Uuid::new_v4(),
///     timestamp: Utc::now(),
/// });
///
/// assert_eq!(history.get_path(), vec!["Idle", "Running"]);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteHistory {
    limit: usize,
    records: VecDeque<RouteRecord>,
}

impl Default for RouteHistory {
    fn default() -> Self {
        Self::with_limit(0)
    }
}

impl RouteHistory {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            records: VecDeque::new(),
        }
    }

    /// Append a record, evicting the oldest one when the limit is reached.
    pub fn record(&mut self, record: RouteRecord) {
        if self.limit > 0 && self.records.len() == self.limit {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn records(&self) -> impl Iterator<Item = &RouteRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&RouteRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// States visited, oldest first.
    ///
    /// Starts with the `from` of the oldest retained record (when known),
    /// followed by the `to` of every record.
    pub fn get_path(&self) -> Vec<&str> {
        let mut path = Vec::with_capacity(self.records.len() + 1);
        if let Some(from) = self.records.front().and_then(|r| r.from.as_deref()) {
            path.push(from);
        }
        path.extend(self.records.iter().map(|r| r.to.as_str()));
        path
    }

    /// Time elapsed between the oldest and newest retained records.
    pub fn duration(&self) -> Option<Duration> {
        let first = self.records.front()?;
        let last = self.records.back()?;
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(from: Option<&str>, to: &str) -> RouteRecord {
        RouteRecord {
            from: from.map(str::to_string),
            to: to.to_string(),
            transition: from.map(|f| format!("{f}->{to}")),
            trigger: None,
            trip_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn new_history_is_empty() {
        let history = RouteHistory::default();
        assert!(history.is_empty());
        assert!(history.get_path().is_empty());
        assert!(history.duration().is_none());
    }

    #[test]
    fn get_path_returns_state_sequence() {
        let mut history = RouteHistory::with_limit(0);
        history.record(record(None, "A"));
        history.record(record(Some("A"), "B"));
        history.record(record(Some("B"), "C"));

        assert_eq!(history.get_path(), vec!["A", "B", "C"]);
        assert_eq!(history.last().map(|r| r.to.as_str()), Some("C"));
    }

    #[test]
    fn limit_evicts_oldest_records() {
        let mut history = RouteHistory::with_limit(2);
        history.record(record(None, "A"));
        history.record(record(Some("A"), "B"));
        history.record(record(Some("B"), "C"));

        assert_eq!(history.len(), 2);
        assert_eq!(history.get_path(), vec!["A", "B", "C"]);

        history.record(record(Some("C"), "D"));
        assert_eq!(history.get_path(), vec!["B", "C", "D"]);
    }

    #[test]
    fn duration_spans_first_to_last() {
        let mut history = RouteHistory::with_limit(0);
        let mut first = record(None, "A");
        first.timestamp = Utc::now() - chrono::Duration::seconds(5);
        history.record(first);
        history.record(record(Some("A"), "B"));

        let elapsed = history.duration().unwrap();
        assert!(elapsed >= Duration::from_secs(4));
    }

    #[test]
    fn history_serializes_correctly() {
        let mut history = RouteHistory::with_limit(8);
        history.record(record(None, "A"));
        history.record(record(Some("A"), "B"));

        let json = serde_json::to_string(&history).unwrap();
        let restored: RouteHistory = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get_path(), vec!["A", "B"]);
    }
}
