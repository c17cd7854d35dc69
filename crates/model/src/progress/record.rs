use crate::records::unit::UnitKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Persisted outcome of a unit. Pending units are simply absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Failed,
    Completed,
}

impl UnitStatus {
    /// Order: Failed (1) < Completed (2). A status never moves down.
    fn rank(self) -> u8 {
        match self {
            UnitStatus::Failed => 1,
            UnitStatus::Completed => 2,
        }
    }
}

/// Durable key -> status mapping for one logical target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub target: String,
    pub units: BTreeMap<UnitKey, UnitStatus>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn empty(target: impl Into<String>) -> Self {
        ProgressRecord {
            target: target.into(),
            units: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Applies `status` to every key, refusing to downgrade a completed unit.
    /// Returns the number of keys whose status changed.
    pub fn mark(&mut self, keys: &[UnitKey], status: UnitStatus) -> usize {
        let mut changed = 0;
        for key in keys {
            match self.units.get(key) {
                Some(existing) if existing.rank() >= status.rank() => {}
                _ => {
                    self.units.insert(key.clone(), status);
                    changed += 1;
                }
            }
        }
        self.updated_at = Utc::now();
        changed
    }

    pub fn status(&self, key: &UnitKey) -> Option<UnitStatus> {
        self.units.get(key).copied()
    }

    pub fn completed_keys(&self) -> HashSet<UnitKey> {
        self.keys_with(UnitStatus::Completed).collect()
    }

    pub fn failed_keys(&self) -> Vec<UnitKey> {
        self.keys_with(UnitStatus::Failed).collect()
    }

    pub fn completed_count(&self) -> usize {
        self.keys_with(UnitStatus::Completed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.keys_with(UnitStatus::Failed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    fn keys_with(&self, status: UnitStatus) -> impl Iterator<Item = UnitKey> + '_ {
        self.units
            .iter()
            .filter(move |(_, s)| **s == status)
            .map(|(k, _)| k.clone())
    }
}

/// Left behind when a target finishes with zero failures and its record is
/// cleared, so that a later `--resume` knows there is nothing left to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub target: String,
    pub finished_at: DateTime<Utc>,
    pub succeeded: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(ids: &[&str]) -> Vec<UnitKey> {
        ids.iter().map(|k| UnitKey::from(*k)).collect()
    }

    #[test]
    fn completed_is_never_downgraded() {
        let mut record = ProgressRecord::empty("t");
        record.mark(&keys(&["a", "b"]), UnitStatus::Completed);

        let changed = record.mark(&keys(&["a", "c"]), UnitStatus::Failed);

        assert_eq!(changed, 1);
        assert_eq!(record.status(&"a".into()), Some(UnitStatus::Completed));
        assert_eq!(record.status(&"c".into()), Some(UnitStatus::Failed));
    }

    #[test]
    fn failed_unit_can_be_completed_later() {
        let mut record = ProgressRecord::empty("t");
        record.mark(&keys(&["a"]), UnitStatus::Failed);
        record.mark(&keys(&["a"]), UnitStatus::Completed);

        assert_eq!(record.failed_count(), 0);
        assert!(record.completed_keys().contains(&UnitKey::from("a")));
    }

    #[test]
    fn serializes_keys_as_plain_strings() {
        let mut record = ProgressRecord::empty("products");
        record.mark(&keys(&["42"]), UnitStatus::Completed);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["units"]["42"], "completed");

        let back: ProgressRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.units, record.units);
    }
}
