use crate::records::unit::{UnitKey, WorkUnit};

/// An ordered, bounded group of work units submitted in one upstream call.
#[derive(Debug, Clone)]
pub struct Batch {
    /// 1-based position of this batch in source order for the current run.
    pub seq: u64,
    pub units: Vec<WorkUnit>,
    pub ts: chrono::DateTime<chrono::Utc>,
}

impl Batch {
    pub fn new(seq: u64, units: Vec<WorkUnit>) -> Self {
        Batch {
            seq,
            units,
            ts: chrono::Utc::now(),
        }
    }

    pub fn id(&self) -> String {
        format!("batch-{}", self.seq)
    }

    pub fn keys(&self) -> Vec<UnitKey> {
        self.units.iter().map(|u| u.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.units.iter().map(|u| u.payload.size_bytes()).sum()
    }
}
