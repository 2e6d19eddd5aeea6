// Reorder buffer: accepts segments in completion order, releases them in
// strictly ascending index order.

use std::collections::BTreeMap;

use crate::error::TransferError;

#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next_index: usize,
    pending: BTreeMap<usize, T>,
    peak_pending: usize,
}

impl<T> ReorderBuffer<T> {
    pub fn new(first_index: usize) -> Self {
        Self {
            next_index: first_index,
            pending: BTreeMap::new(),
            peak_pending: 0,
        }
    }

    /// Buffer `item`. Stale or duplicate indices are rejected.
    pub fn insert(&mut self, index: usize, item: T) -> Result<(), TransferError> {
        if index < self.next_index || self.pending.contains_key(&index) {
            return Err(TransferError::Internal {
                reason: format!(
                    "segment {index} delivered twice (next expected {})",
                    self.next_index
                ),
            });
        }
        self.pending.insert(index, item);
        self.peak_pending = self.peak_pending.max(self.pending.len());
        Ok(())
    }

    /// Next item if it is the one expected.
    pub fn pop_ready(&mut self) -> Option<T> {
        let item = self.pending.remove(&self.next_index)?;
        self.next_index += 1;
        Some(item)
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Largest number of items held at once.
    pub fn peak_pending(&self) -> usize {
        self.peak_pending
    }
}
