//! Indicator storage contract
//!
//! Persistence is a collaborator, not part of the pipeline; the
//! orchestrator only needs deduplicating upsert. The in-memory
//! implementation backs tests and the CLI.

use dashmap::DashMap;
use vigil_core::Indicator;

/// Deduplicating indicator store
///
/// Records sharing an [`Indicator::key`] are the same observation; the
/// implementation reconciles them latest-wins and reports how many keys
/// were newly inserted.
pub trait IndicatorRepository: Send + Sync {
    fn upsert_many(&self, batch: &[Indicator]) -> usize;
}

/// In-process repository backed by a concurrent map
#[derive(Default)]
pub struct MemoryRepository {
    entries: DashMap<String, Indicator>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Indicator> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    pub fn all(&self) -> Vec<Indicator> {
        self.entries.iter().map(|entry| entry.clone()).collect()
    }
}

impl IndicatorRepository for MemoryRepository {
    fn upsert_many(&self, batch: &[Indicator]) -> usize {
        let mut inserted = 0;
        for indicator in batch {
            if self
                .entries
                .insert(indicator.key(), indicator.clone())
                .is_none()
            {
                inserted += 1;
            }
        }
        inserted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::IndicatorKind;

    fn indicator(value: &str, confidence: i64) -> Indicator {
        Indicator::new(IndicatorKind::Ip, value, "otx", confidence)
    }

    #[test]
    fn test_upsert_counts_new_keys() {
        let repo = MemoryRepository::new();
        let inserted = repo.upsert_many(&[indicator("1.1.1.1", 50), indicator("2.2.2.2", 50)]);
        assert_eq!(inserted, 2);
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn test_same_key_reconciles_latest_wins() {
        let repo = MemoryRepository::new();
        repo.upsert_many(&[indicator("1.1.1.1", 50)]);
        let inserted = repo.upsert_many(&[indicator("1.1.1.1", 90)]);
        assert_eq!(inserted, 0);
        assert_eq!(repo.len(), 1);
        assert_eq!(repo.get("ip:1.1.1.1:otx").unwrap().confidence, 90);
    }

    #[test]
    fn test_same_value_different_source_is_distinct() {
        let repo = MemoryRepository::new();
        let a = indicator("1.1.1.1", 50);
        let b = Indicator::new(IndicatorKind::Ip, "1.1.1.1", "shodan", 60);
        assert_eq!(repo.upsert_many(&[a, b]), 2);
    }
}
