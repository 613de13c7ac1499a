//! Bounded mutation buffer.
//!
//! Upserts are collected into a pending group of at most `capacity` mutations.
//! A full group is applied to the store atomically; a failed apply leaves the
//! group pending so the caller can retry with [`MutationBuffer::flush`].

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{DumpError, Result};
use crate::store::{Mutation, Store};

/// Default number of mutations per applied group.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Accumulates mutations and applies them in bounded atomic groups.
pub struct MutationBuffer {
    store: Arc<dyn Store>,
    capacity: usize,
    pending: Vec<Mutation>,
    flushes: usize,
    applied: usize,
}

impl MutationBuffer {
    /// Create a buffer. A capacity of zero is treated as one.
    pub fn new(store: Arc<dyn Store>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            store,
            capacity,
            pending: Vec::with_capacity(capacity),
            flushes: 0,
            applied: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mutations waiting for the next flush.
    pub fn pending(&self) -> &[Mutation] {
        &self.pending
    }

    /// Number of successful flushes so far.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Number of mutations applied so far.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Append a group of mutations, flushing every time the buffer fills.
    ///
    /// With `force_flush`, whatever remains pending after placing the group is
    /// flushed as well. If a flush fails, appending stops: the failed group
    /// stays pending and the error reports how many of `group` were not placed.
    pub async fn append(&mut self, group: Vec<Mutation>, force_flush: bool) -> Result<()> {
        let mut remaining = group.into_iter();
        let mut left = remaining.len();

        while left > 0 {
            let room = self.capacity - self.pending.len();
            let take = room.min(left);
            self.pending.extend(remaining.by_ref().take(take));
            left -= take;

            if self.pending.len() == self.capacity {
                self.flush_reporting(left).await?;
            }
        }

        if force_flush {
            self.flush_reporting(0).await?;
        }
        Ok(())
    }

    /// Apply the pending group. An empty group is a no-op.
    pub async fn flush(&mut self) -> Result<()> {
        self.flush_reporting(0).await
    }

    async fn flush_reporting(&mut self, unplaced: usize) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let count = self.pending.len();
        match self.store.apply(&self.pending).await {
            Ok(()) => {
                self.pending.clear();
                self.flushes += 1;
                self.applied += count;
                debug!("Flushed {} mutations", count);
                Ok(())
            }
            Err(e) => {
                warn!("Flush of {} mutations failed: {}", count, e);
                Err(DumpError::MutationApply {
                    pending: count,
                    unplaced,
                    message: e.to_string(),
                })
            }
        }
    }

    /// Flush what is left and release the buffer.
    ///
    /// On failure the error names how many mutations were dropped.
    pub async fn close(mut self) -> Result<()> {
        self.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Value;
    use crate::store::MemoryStore;

    fn upsert(id: i64) -> Mutation {
        Mutation {
            table: "Users".into(),
            columns: vec!["id".into(), "name".into()],
            primary_key: vec!["id".into()],
            values: vec![Value::Int64(id), Value::from(format!("u{}", id))],
        }
    }

    fn upserts(range: std::ops::Range<i64>) -> Vec<Mutation> {
        range.map(upsert).collect()
    }

    fn setup(capacity: usize) -> (Arc<MemoryStore>, MutationBuffer) {
        let store = Arc::new(MemoryStore::new());
        let buffer = MutationBuffer::new(store.clone(), capacity);
        (store, buffer)
    }

    #[tokio::test]
    async fn test_capacity_two_with_three_upserts() {
        let (store, mut buffer) = setup(2);
        buffer.append(upserts(1..4), false).await.unwrap();

        let groups = store.applied_groups();
        assert_eq!(groups, vec![upserts(1..3)]);
        assert_eq!(buffer.pending(), upserts(3..4).as_slice());
    }

    #[tokio::test]
    async fn test_large_group_fills_and_flushes() {
        let (store, mut buffer) = setup(5);
        buffer.append(upserts(0..13), false).await.unwrap();

        assert_eq!(store.applied_groups().len(), 2);
        assert_eq!(buffer.pending().len(), 3);
    }

    #[tokio::test]
    async fn test_single_appends_flush_every_capacity() {
        let (store, mut buffer) = setup(4);
        for id in 0..10 {
            buffer.append(vec![upsert(id)], false).await.unwrap();
        }
        assert_eq!(store.applied_groups().len(), 2);

        buffer.close().await.unwrap();
        let groups = store.applied_groups();
        assert_eq!(groups.len(), 3);
        let applied: Vec<Mutation> = groups.into_iter().flatten().collect();
        assert_eq!(applied, upserts(0..10));
    }

    #[tokio::test]
    async fn test_append_fills_remaining_room_first() {
        let (store, mut buffer) = setup(3);
        buffer.append(upserts(0..2), false).await.unwrap();
        buffer.append(upserts(2..7), false).await.unwrap();

        let groups = store.applied_groups();
        assert_eq!(groups, vec![upserts(0..3), upserts(3..6)]);
        assert_eq!(buffer.pending(), upserts(6..7).as_slice());
    }

    #[tokio::test]
    async fn test_forced_flush_applies_partial_group() {
        let (store, mut buffer) = setup(10);
        buffer.append(upserts(0..3), true).await.unwrap();
        assert_eq!(store.applied_groups(), vec![upserts(0..3)]);
        assert!(buffer.pending().is_empty());
        assert_eq!(buffer.flushes(), 1);
        assert_eq!(buffer.applied(), 3);
    }

    #[tokio::test]
    async fn test_empty_flush_is_noop() {
        let (store, mut buffer) = setup(2);
        store.fail_next_applies(1);
        buffer.flush().await.unwrap();
        buffer.append(Vec::new(), true).await.unwrap();
        assert!(store.applied_groups().is_empty());
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_group() {
        let (store, mut buffer) = setup(2);
        store.fail_next_applies(1);

        let err = buffer.append(upserts(0..5), false).await.unwrap_err();
        match err {
            DumpError::MutationApply {
                pending, unplaced, ..
            } => {
                assert_eq!(pending, 2);
                assert_eq!(unplaced, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(buffer.pending(), upserts(0..2).as_slice());
        assert!(store.rows("Users").is_empty());

        buffer.flush().await.unwrap();
        assert!(buffer.pending().is_empty());
        assert_eq!(store.rows("Users").len(), 2);
    }

    #[tokio::test]
    async fn test_close_reports_dropped_mutations() {
        let (store, mut buffer) = setup(10);
        buffer.append(upserts(0..4), false).await.unwrap();
        store.fail_next_applies(1);

        match buffer.close().await {
            Err(DumpError::MutationApply { pending, .. }) => assert_eq!(pending, 4),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        assert_eq!(MutationBuffer::new(store, 0).capacity(), 1);
    }
}
