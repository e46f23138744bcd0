use crate::config::types::DuplicatePolicy;
use crate::message::{AggregatedReport, CorrelationId, UnitResult};
use crate::shard::{ShardedMap, DEFAULT_SHARDS};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("totalUnits must be at least 1")]
    ZeroTotal,

    #[error("totalUnits {actual} does not match the group's total of {expected}")]
    TotalMismatch { expected: usize, actual: usize },
}

/// What happened to a result handed to the store
#[derive(Debug)]
pub enum Outcome {
    /// Accepted; the group is still waiting for more results
    Pending { received: usize, total: usize },
    /// Accepted and it was the last one. The group is gone from the store.
    Completed(AggregatedReport),
    /// Already have this unit (or the group already completed); ignored
    Duplicate,
    Rejected(StoreError),
}

/// Accumulator for the results of one batch request
struct AggregationGroup {
    correlation_id: CorrelationId,
    total_units: usize,
    received: Vec<UnitResult>,
    seen: HashSet<(String, usize)>,
    started_at: Instant,
    /// Set once the group completed under `DuplicatePolicy::Deduplicate`; the
    /// entry then only serves to swallow late redeliveries.
    completed_at: Option<Instant>,
}

impl AggregationGroup {
    fn new(correlation_id: CorrelationId, total_units: usize, started_at: Instant) -> Self {
        Self {
            correlation_id,
            total_units,
            received: Vec::with_capacity(total_units),
            seen: HashSet::new(),
            started_at,
            completed_at: None,
        }
    }

    fn received_count(&self) -> usize {
        self.received.len()
    }

    fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }

    fn has_unit(&self, result: &UnitResult) -> bool {
        self.seen.contains(&(result.unit_key.clone(), result.unit_index))
    }

    fn add(&mut self, result: UnitResult) {
        self.seen.insert((result.unit_key.clone(), result.unit_index));
        self.received.push(result);
    }

    fn is_complete(&self) -> bool {
        self.received.len() == self.total_units
    }

    fn build_report(&self) -> AggregatedReport {
        AggregatedReport::from_results(
            self.correlation_id.clone(),
            self.total_units,
            &self.received,
        )
    }

    fn close(&mut self, now: Instant) {
        self.received = Vec::new();
        self.seen = HashSet::new();
        self.completed_at = Some(now);
    }

    fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        let since = self.completed_at.unwrap_or(self.started_at);
        now.saturating_duration_since(since) > timeout
    }
}

/// A group removed by the expiry sweep before it completed
#[derive(Debug, Clone)]
pub struct ExpiredGroup {
    pub correlation_id: CorrelationId,
    pub received: usize,
    pub total_units: usize,
    pub age: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub open_groups: usize,
    pub completed: u64,
    pub expired: u64,
    pub duplicates: u64,
    pub rejected: u64,
}

/// Per-correlation-id aggregation of unit results.
///
/// Completion is decided by counting: a group is complete when it has accepted
/// as many results as the `totalUnits` carried by its first result. The first
/// result for an unseen id creates the group. Results for one id are applied
/// atomically; ids in different shards never contend.
pub struct AggregationStore {
    groups: ShardedMap<AggregationGroup>,
    policy: DuplicatePolicy,
    completed: AtomicU64,
    expired: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
}

impl AggregationStore {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self::with_shards(policy, DEFAULT_SHARDS)
    }

    pub fn with_shards(policy: DuplicatePolicy, shards: usize) -> Self {
        Self {
            groups: ShardedMap::new(shards),
            policy,
            completed: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn on_unit_result(&self, result: UnitResult) -> Outcome {
        self.on_unit_result_at(result, Instant::now())
    }

    pub fn on_unit_result_at(&self, result: UnitResult, now: Instant) -> Outcome {
        if result.total_units == 0 {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Outcome::Rejected(StoreError::ZeroTotal);
        }

        let id = result.correlation_id.clone();
        let outcome = self.groups.with_shard(&id, |groups| {
            let group = groups.entry(id.clone()).or_insert_with(|| {
                tracing::debug!(
                    correlation_id = %id,
                    total_units = result.total_units,
                    "Creating aggregation group"
                );
                AggregationGroup::new(id.clone(), result.total_units, now)
            });

            if !group.is_open() {
                return Outcome::Duplicate;
            }
            if group.total_units != result.total_units {
                return Outcome::Rejected(StoreError::TotalMismatch {
                    expected: group.total_units,
                    actual: result.total_units,
                });
            }
            if self.policy == DuplicatePolicy::Deduplicate && group.has_unit(&result) {
                return Outcome::Duplicate;
            }

            group.add(result);
            if !group.is_complete() {
                return Outcome::Pending {
                    received: group.received_count(),
                    total: group.total_units,
                };
            }

            let report = group.build_report();
            match self.policy {
                DuplicatePolicy::Deduplicate => group.close(now),
                DuplicatePolicy::Count => {
                    groups.remove(&id);
                }
            }
            Outcome::Completed(report)
        });

        match &outcome {
            Outcome::Completed(_) => self.completed.fetch_add(1, Ordering::Relaxed),
            Outcome::Duplicate => self.duplicates.fetch_add(1, Ordering::Relaxed),
            Outcome::Rejected(_) => self.rejected.fetch_add(1, Ordering::Relaxed),
            Outcome::Pending { .. } => 0,
        };

        outcome
    }

    /// Drop every open group older than `timeout`. No partial report is built.
    ///
    /// Completion markers kept for deduplication are purged on the same schedule.
    pub fn sweep_expired(&self, now: Instant, timeout: Duration) -> Vec<ExpiredGroup> {
        let expired: Vec<ExpiredGroup> = self
            .groups
            .extract_if(|_, group| group.is_expired(now, timeout))
            .into_iter()
            .filter(|(_, group)| group.is_open())
            .map(|(correlation_id, group)| ExpiredGroup {
                correlation_id,
                received: group.received_count(),
                total_units: group.total_units,
                age: now.saturating_duration_since(group.started_at),
            })
            .collect();

        self.expired.fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired
    }

    /// `(received, total)` for an open group
    pub fn progress(&self, correlation_id: &CorrelationId) -> Option<(usize, usize)> {
        self.groups.with_shard(correlation_id, |groups| {
            groups
                .get(correlation_id)
                .filter(|g| g.is_open())
                .map(|g| (g.received_count(), g.total_units))
        })
    }

    pub fn contains(&self, correlation_id: &CorrelationId) -> bool {
        self.progress(correlation_id).is_some()
    }

    pub fn open_groups(&self) -> usize {
        self.groups.count_where(AggregationGroup::is_open)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            open_groups: self.open_groups(),
            completed: self.completed.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
