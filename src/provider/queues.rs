//! Recycling policy for delivered and processed frames.
//!
//! `FrameQueues` is the bookkeeping half of the frame provider, kept free of
//! locking and I/O so the policy can be exercised directly:
//!
//! - `delivered` holds frames fetched from the backend that the consumer has
//!   not taken, oldest first.
//! - `processed` holds frames the consumer handed back, oldest first.
//!
//! Each newly fetched frame may free one buffer for the backend. Buffers the
//! consumer already released are always preferred; otherwise the oldest
//! delivered frame is dropped once `delivered` exceeds the watermark.
//!
//! The consumer only ever receives the newest delivered frame, and only if it
//! is newer than the last one it received. Older entries are stale and wait
//! in `delivered` until the recycling policy hands them back to the backend.

use std::collections::VecDeque;

/// Which queue a recycled buffer was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecycleSource {
    /// Released by the consumer.
    Processed,
    /// Never seen by the consumer; dropped to respect the watermark.
    Delivered,
}

/// Delivered/processed queues with a watermark.
#[derive(Debug)]
pub struct FrameQueues<T> {
    delivered: VecDeque<(u64, T)>,
    processed: VecDeque<T>,
    watermark: usize,
    next_ordinal: u64,
    last_taken: Option<u64>,
}

impl<T> FrameQueues<T> {
    /// Creates empty queues keeping up to `watermark` delivered frames.
    pub fn new(watermark: usize) -> Self {
        Self {
            delivered: VecDeque::with_capacity(watermark + 1),
            processed: VecDeque::new(),
            watermark,
            next_ordinal: 0,
            last_taken: None,
        }
    }

    /// Appends a fetched frame and picks at most one buffer to recycle.
    pub fn deliver(&mut self, frame: T) -> Option<(T, RecycleSource)> {
        self.delivered.push_back((self.next_ordinal, frame));
        self.next_ordinal += 1;

        if let Some(released) = self.processed.pop_front() {
            return Some((released, RecycleSource::Processed));
        }

        if self.delivered.len() > self.watermark {
            return self
                .delivered
                .pop_front()
                .map(|(_, stale)| (stale, RecycleSource::Delivered));
        }

        None
    }

    /// True if a frame newer than the last one taken is waiting.
    pub fn has_fresh(&self) -> bool {
        match (self.delivered.back(), self.last_taken) {
            (Some((ordinal, _)), Some(last)) => *ordinal > last,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Removes and returns the most recently delivered frame.
    ///
    /// Returns `None` if nothing newer than the last taken frame has been
    /// delivered. Older delivered frames stay queued until `deliver`
    /// recycles them.
    pub fn take_latest(&mut self) -> Option<T> {
        if !self.has_fresh() {
            return None;
        }
        let (ordinal, frame) = self.delivered.pop_back()?;
        self.last_taken = Some(ordinal);
        Some(frame)
    }

    /// Queues a frame the consumer has finished with.
    pub fn push_processed(&mut self, frame: T) {
        self.processed.push_back(frame);
    }

    #[inline]
    pub fn delivered_len(&self) -> usize {
        self.delivered.len()
    }

    #[inline]
    pub fn processed_len(&self) -> usize {
        self.processed.len()
    }

    #[inline]
    pub fn watermark(&self) -> usize {
        self.watermark
    }

    /// Delivered frames, oldest first.
    pub fn delivered(&self) -> impl Iterator<Item = &T> {
        self.delivered.iter().map(|(_, frame)| frame)
    }

    /// Processed frames, oldest first.
    pub fn processed(&self) -> impl Iterator<Item = &T> {
        self.processed.iter()
    }

    /// Empties both queues, processed frames first.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.processed
            .drain(..)
            .chain(self.delivered.drain(..).map(|(_, frame)| frame))
    }
}
