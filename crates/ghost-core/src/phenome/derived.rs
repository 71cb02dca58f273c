//! Derived state store: tier two of the phenome.
//!
//! Mutable state computed from raw signals: training blocks, morning-state
//! snapshots, and aggregate workout statistics. Retention horizon is 30
//! days; block status changes go through the lifecycle guard.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ValidationError;
use crate::events::{BlockStatus, TrainingBlock, WorkoutType};
use crate::recovery::RecoveryStatus;

/// Snapshot of what the morning cycle concluded for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorningState {
    pub date: NaiveDate,
    pub recovery_score: f64,
    pub recovery_status: RecoveryStatus,
    /// Blocks flagged at or above the suggest-alternative band.
    pub high_risk_blocks: u32,
    pub proposals_emitted: u32,
    pub computed_at: DateTime<Utc>,
}

/// Aggregate workout statistics over the derived window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutStatistics {
    pub scheduled: u32,
    pub completed: u32,
    pub missed: u32,
    pub deleted: u32,
    pub by_type: BTreeMap<WorkoutType, u32>,
}

impl WorkoutStatistics {
    pub fn completion_rate(&self) -> f64 {
        let resolved = self.completed + self.missed;
        if resolved == 0 {
            0.5
        } else {
            self.completed as f64 / resolved as f64
        }
    }
}

/// Store for blocks, morning states, and statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DerivedStateStore {
    blocks: BTreeMap<String, TrainingBlock>,
    morning_states: BTreeMap<NaiveDate, MorningState>,
}

impl DerivedStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Blocks ───────────────────────────────────────────────────────

    pub fn upsert_block(&mut self, block: TrainingBlock) {
        self.blocks.insert(block.id.clone(), block);
    }

    pub fn block(&self, id: &str) -> Option<&TrainingBlock> {
        self.blocks.get(id)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &TrainingBlock> {
        self.blocks.values()
    }

    pub fn blocks_on(&self, date: NaiveDate) -> Vec<&TrainingBlock> {
        let mut blocks: Vec<_> = self
            .blocks
            .values()
            .filter(|b| b.start_time.date_naive() == date)
            .collect();
        blocks.sort_by_key(|b| b.start_time);
        blocks
    }

    /// Move a block to a terminal status through the lifecycle guard.
    pub fn transition_block(
        &mut self,
        id: &str,
        status: BlockStatus,
    ) -> Result<&TrainingBlock, ValidationError> {
        let block = self.blocks.get_mut(id).ok_or_else(|| ValidationError::InvalidValue {
            field: "block_id".into(),
            message: format!("unknown block '{id}'"),
        })?;
        block.transition_to(status)?;
        Ok(block)
    }

    // ── Morning states ───────────────────────────────────────────────

    pub fn set_morning_state(&mut self, state: MorningState) {
        self.morning_states.insert(state.date, state);
    }

    pub fn morning_state(&self, date: NaiveDate) -> Option<&MorningState> {
        self.morning_states.get(&date)
    }

    // ── Statistics ───────────────────────────────────────────────────

    /// Aggregate statistics over all held blocks.
    pub fn statistics(&self) -> WorkoutStatistics {
        let mut stats = WorkoutStatistics::default();
        for block in self.blocks.values() {
            match block.status {
                BlockStatus::Scheduled => stats.scheduled += 1,
                BlockStatus::Completed => {
                    stats.completed += 1;
                    *stats.by_type.entry(block.workout_type).or_default() += 1;
                }
                BlockStatus::Missed => stats.missed += 1,
                BlockStatus::Deleted => stats.deleted += 1,
                BlockStatus::Transformed => {}
            }
        }
        stats
    }

    /// Drop records older than the retention horizon.
    pub fn prune(&mut self, now: DateTime<Utc>, retention_days: i64) {
        let cutoff = now - Duration::days(retention_days);
        let date_cutoff = cutoff.date_naive();
        self.blocks.retain(|_, b| b.end_time >= cutoff);
        self.morning_states.retain(|date, _| *date >= date_cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 7, 0, 0).unwrap()
    }

    fn block_at(day_offset: i64, status: BlockStatus) -> TrainingBlock {
        let start = t0() + Duration::days(day_offset);
        let mut block =
            TrainingBlock::new(WorkoutType::Run, start, start + Duration::minutes(45), true);
        block.status = status;
        block
    }

    #[test]
    fn test_transition_through_guard() {
        let mut store = DerivedStateStore::new();
        let block = block_at(0, BlockStatus::Scheduled);
        let id = block.id.clone();
        store.upsert_block(block);

        store.transition_block(&id, BlockStatus::Completed).unwrap();
        // Completed can never become missed.
        assert!(store.transition_block(&id, BlockStatus::Missed).is_err());
        assert_eq!(store.block(&id).unwrap().status, BlockStatus::Completed);
    }

    #[test]
    fn test_unknown_block_rejected() {
        let mut store = DerivedStateStore::new();
        assert!(store.transition_block("nope", BlockStatus::Deleted).is_err());
    }

    #[test]
    fn test_blocks_on_date_sorted() {
        let mut store = DerivedStateStore::new();
        let mut early = block_at(0, BlockStatus::Scheduled);
        early.start_time = t0();
        early.end_time = t0() + Duration::minutes(45);
        let mut late = block_at(0, BlockStatus::Scheduled);
        late.start_time = t0() + Duration::hours(10);
        late.end_time = late.start_time + Duration::minutes(45);
        store.upsert_block(late.clone());
        store.upsert_block(early.clone());

        let blocks = store.blocks_on(t0().date_naive());
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].id, early.id);
    }

    #[test]
    fn test_statistics_aggregation() {
        let mut store = DerivedStateStore::new();
        store.upsert_block(block_at(0, BlockStatus::Completed));
        store.upsert_block(block_at(1, BlockStatus::Completed));
        store.upsert_block(block_at(2, BlockStatus::Missed));
        store.upsert_block(block_at(3, BlockStatus::Scheduled));

        let stats = store.statistics();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.missed, 1);
        assert_eq!(stats.scheduled, 1);
        assert!((stats.completion_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_prune_by_retention() {
        let mut store = DerivedStateStore::new();
        store.upsert_block(block_at(-40, BlockStatus::Completed));
        store.upsert_block(block_at(-5, BlockStatus::Completed));
        store.prune(t0(), 30);
        assert_eq!(store.blocks().count(), 1);
    }
}
