//! Per-partition offset bookkeeping for concurrently-processed messages.
//!
//! Answers one question: under concurrent processing of up to N messages from the same
//! partition, which offsets may be committed without risking data loss on restart? Only
//! a contiguous prefix of `success` offsets may ever be committed; a `processing` or
//! `failed` entry blocks the watermark at the offset before it.

use std::collections::BTreeMap;
use std::sync::Mutex;

use rdkafka::consumer::Consumer;
use rdkafka::error::KafkaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OffsetStatus {
    Processing,
    Success,
    Failed,
}

/// Abstraction over "store this offset with the broker client", so the tracker can be
/// unit tested without a live `StreamConsumer`. `store_offset` only records the offset
/// locally for the next auto-commit cycle (auto-commit *store* is always disabled; only
/// the interval-based commit of manually stored offsets is used).
pub trait OffsetCommitter: Send + Sync {
    fn store_offset(&self, topic: &str, partition: i32, offset: i64) -> Result<(), KafkaError>;
}

impl<C: Consumer> OffsetCommitter for C {
    fn store_offset(&self, topic: &str, partition: i32, offset: i64) -> Result<(), KafkaError> {
        Consumer::store_offset(self, topic, partition, offset)
    }
}

struct PartitionState {
    offsets: BTreeMap<i64, OffsetStatus>,
}

impl PartitionState {
    fn new() -> Self {
        Self {
            offsets: BTreeMap::new(),
        }
    }

    /// Largest `o` such that every tracked offset `<= o` is `Success`, or `None` if the
    /// lowest tracked offset isn't itself `Success`.
    fn watermark(&self) -> Option<i64> {
        let mut last_success = None;
        for (&offset, &status) in self.offsets.iter() {
            match status {
                OffsetStatus::Success => last_success = Some(offset),
                OffsetStatus::Processing | OffsetStatus::Failed => break,
            }
        }
        last_success
    }
}

/// Tracks in-flight offsets for a single `(topic, partition)` pair and commits the
/// largest gap-free success prefix to the broker.
///
/// The partition mutex is held across both the state transition and the broker
/// `store_offset` call: otherwise a racing `mark_success` could compute a watermark that
/// later turns out to include an offset whose predecessor transitions to `failed`.
pub struct PartitionTracker<C: OffsetCommitter> {
    committer: C,
    topic: String,
    partition: i32,
    state: Mutex<PartitionState>,
}

impl<C: OffsetCommitter> PartitionTracker<C> {
    pub fn new(committer: C, topic: impl Into<String>, partition: i32) -> Self {
        Self {
            committer,
            topic: topic.into(),
            partition,
            state: Mutex::new(PartitionState::new()),
        }
    }

    pub fn mark_processing(&self, offset: i64) {
        let mut state = self.state.lock().unwrap();
        state.offsets.insert(offset, OffsetStatus::Processing);
    }

    /// No commit: the offset is left to be re-delivered after rebalance/restart.
    pub fn mark_failed(&self, offset: i64) {
        let mut state = self.state.lock().unwrap();
        state.offsets.insert(offset, OffsetStatus::Failed);
    }

    /// Marks `offset` successful, recomputes the watermark, and -- if it advanced --
    /// commits `watermark + 1` to the broker and prunes every entry `<= watermark`.
    pub fn mark_success(&self, offset: i64) -> Result<(), KafkaError> {
        let mut state = self.state.lock().unwrap();
        state.offsets.insert(offset, OffsetStatus::Success);

        let Some(watermark) = state.watermark() else {
            return Ok(());
        };

        self.committer
            .store_offset(&self.topic, self.partition, watermark + 1)?;
        state.offsets.retain(|&o, _| o > watermark);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingCommitter {
        calls: Mutex<Vec<i64>>,
    }

    impl RecordingCommitter {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<i64> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl OffsetCommitter for RecordingCommitter {
        fn store_offset(&self, _topic: &str, _partition: i32, offset: i64) -> Result<(), KafkaError> {
            self.calls.lock().unwrap().push(offset);
            Ok(())
        }
    }

    #[test]
    fn commits_only_the_contiguous_success_prefix() {
        let tracker = PartitionTracker::new(RecordingCommitter::new(), "t", 0);
        tracker.mark_processing(100);
        tracker.mark_processing(101);
        tracker.mark_processing(102);

        // 102 finishes first but 100/101 are still outstanding: no commit yet.
        tracker.mark_success(102).unwrap();
        assert!(tracker.committer.calls().is_empty());

        tracker.mark_success(100).unwrap();
        assert_eq!(tracker.committer.calls(), vec![101]);

        // 101 finishes last: watermark jumps straight to 103 (102 + 1).
        tracker.mark_success(101).unwrap();
        assert_eq!(tracker.committer.calls(), vec![101, 103]);

        assert!(tracker.state.lock().unwrap().offsets.is_empty());
    }

    #[test]
    fn a_failed_offset_blocks_the_watermark() {
        let tracker = PartitionTracker::new(RecordingCommitter::new(), "t", 0);
        tracker.mark_processing(200);
        tracker.mark_failed(200);
        tracker.mark_processing(201);
        tracker.mark_success(201).unwrap();

        assert!(tracker.committer.calls().is_empty());
    }
}
