use image::{GrayImage, RgbaImage};
use std::collections::VecDeque;
use std::ops::Range;
use tracing::debug;

use crate::error::{RedactError, Result};

/// Default number of retained entries.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

// ============================================================================
// HISTORY ENTRY
// ============================================================================

/// A committed-mask snapshot plus the thumbnail shown in the history strip.
#[derive(Clone)]
pub struct HistoryEntry {
    pub mask: GrayImage,
    pub thumbnail: RgbaImage,
}

impl HistoryEntry {
    pub fn memory_size(&self) -> usize {
        self.mask.as_raw().len() + self.thumbnail.as_raw().len()
    }
}

// ============================================================================
// HISTORY STORE - bounded linear history with a cursor
// ============================================================================

/// Bounded ring of mask snapshots with a current-position cursor.
///
/// `position` is `None` exactly when the store is empty; otherwise it always
/// indexes a live entry. Pushing after an undo drops the redo branch; pushing
/// past capacity evicts the oldest entries.
pub struct HistoryStore {
    entries: VecDeque<HistoryEntry>,
    position: Option<usize>,
    capacity: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across all entries.
    total_memory: usize,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            position: None,
            capacity: capacity.max(1),
            max_memory_bytes: Some(256 * 1024 * 1024), // 256 MB default limit
            total_memory: 0,
        }
    }

    pub fn with_memory_limit(mut self, max_bytes: Option<usize>) -> Self {
        self.max_memory_bytes = max_bytes;
        self
    }

    /// Truncate the redo branch, append, then trim from the oldest end.
    /// The new entry always becomes current.
    pub fn push(&mut self, mask: GrayImage, thumbnail: RgbaImage) {
        if let Some(pos) = self.position {
            while self.entries.len() > pos + 1 {
                if let Some(dropped) = self.entries.pop_back() {
                    self.total_memory = self.total_memory.saturating_sub(dropped.memory_size());
                }
            }
        }

        let entry = HistoryEntry { mask, thumbnail };
        self.total_memory += entry.memory_size();
        self.entries.push_back(entry);
        self.prune();
        self.position = Some(self.entries.len() - 1);
        debug!(len = self.entries.len(), memory = self.total_memory, "history push");
    }

    /// Step back one entry and return its mask.
    pub fn undo(&mut self) -> Result<&GrayImage> {
        match self.position {
            Some(pos) if pos > 0 => {
                self.position = Some(pos - 1);
                Ok(&self.entries[pos - 1].mask)
            }
            _ => Err(RedactError::NothingToUndo),
        }
    }

    /// Step forward one entry and return its mask.
    pub fn redo(&mut self) -> Result<&GrayImage> {
        match self.position {
            Some(pos) if pos + 1 < self.entries.len() => {
                self.position = Some(pos + 1);
                Ok(&self.entries[pos + 1].mask)
            }
            _ => Err(RedactError::NothingToRedo),
        }
    }

    /// Jump to any live entry.
    pub fn go_to(&mut self, index: usize) -> Result<&GrayImage> {
        if index >= self.entries.len() {
            return Err(RedactError::OutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        self.position = Some(index);
        Ok(&self.entries[index].mask)
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.position = None;
        self.total_memory = 0;
    }

    pub fn can_undo(&self) -> bool {
        self.position.is_some_and(|p| p > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.position.is_some_and(|p| p + 1 < self.entries.len())
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.position.and_then(|p| self.entries.get(p))
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn thumbnails(&self) -> impl Iterator<Item = &RgbaImage> + '_ {
        self.entries.iter().map(|e| &e.thumbnail)
    }

    /// Get the current memory usage of the history (O(1) via cached total)
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// Indices of the thumbnails a strip with room for `max_visible` should
    /// show: centred on the current entry, clamped to both ends.
    pub fn strip_window(&self, max_visible: usize) -> Range<usize> {
        let len = self.entries.len();
        if max_visible == 0 || len == 0 {
            return 0..0;
        }
        if len <= max_visible {
            return 0..len;
        }
        let pos = self.position.unwrap_or(0);
        let start = pos.saturating_sub(max_visible / 2).min(len - max_visible);
        start..start + max_visible
    }

    /// History index shown in strip slot `slot` (0 = leftmost), for handing
    /// a thumbnail click to [`go_to`](Self::go_to).
    pub fn strip_index(&self, slot: usize, max_visible: usize) -> Option<usize> {
        let window = self.strip_window(max_visible);
        let index = window.start.checked_add(slot)?;
        window.contains(&index).then_some(index)
    }

    /// Drop oldest entries past the count or memory limits.
    fn prune(&mut self) {
        while self.entries.len() > self.capacity {
            self.pop_oldest();
        }
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.entries.len() > 1 {
                self.pop_oldest();
            }
        }
    }

    fn pop_oldest(&mut self) {
        if let Some(removed) = self.entries.pop_front() {
            self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Mask tagged by its single pixel value.
    fn tagged(tag: u8) -> GrayImage {
        GrayImage::from_pixel(2, 2, Luma([tag]))
    }

    fn tag_of(mask: &GrayImage) -> u8 {
        mask.get_pixel(0, 0).0[0]
    }

    fn push(h: &mut HistoryStore, tag: u8) {
        h.push(tagged(tag), RgbaImage::new(1, 1));
    }

    #[test]
    fn starts_empty() {
        let mut h = HistoryStore::default();
        assert_eq!(h.position(), None);
        assert!(matches!(h.undo(), Err(RedactError::NothingToUndo)));
        assert!(matches!(h.redo(), Err(RedactError::NothingToRedo)));
        assert!(matches!(h.go_to(0), Err(RedactError::OutOfRange { index: 0, len: 0 })));
    }

    #[test]
    fn keeps_only_the_most_recent_capacity_entries() {
        let mut h = HistoryStore::new(5);
        for tag in 1..=8 {
            push(&mut h, tag);
        }
        assert_eq!(h.len(), 5);
        assert_eq!(h.position(), Some(4));
        let tags: Vec<u8> = (0..5).map(|i| tag_of(&h.get(i).unwrap().mask)).collect();
        assert_eq!(tags, vec![4, 5, 6, 7, 8]);
    }

    #[test]
    fn undo_then_redo_restores_position_and_mask() {
        let mut h = HistoryStore::default();
        for tag in 1..=3 {
            push(&mut h, tag);
        }
        assert_eq!(tag_of(h.undo().unwrap()), 2);
        assert_eq!(tag_of(h.redo().unwrap()), 3);
        assert_eq!(h.position(), Some(2));
        assert!(matches!(h.redo(), Err(RedactError::NothingToRedo)));
    }

    #[test]
    fn push_after_undo_discards_the_branch() {
        let mut h = HistoryStore::default();
        push(&mut h, b'A');
        push(&mut h, b'B');
        push(&mut h, b'C');
        h.undo().unwrap();
        h.undo().unwrap();
        push(&mut h, b'D');
        assert_eq!(h.len(), 2);
        assert_eq!(h.position(), Some(1));
        assert_eq!(tag_of(&h.get(0).unwrap().mask), b'A');
        assert_eq!(tag_of(&h.get(1).unwrap().mask), b'D');
        assert!(!h.can_redo());
    }

    #[test]
    fn go_to_and_reset() {
        let mut h = HistoryStore::default();
        for tag in 1..=4 {
            push(&mut h, tag);
        }
        assert_eq!(tag_of(h.go_to(1).unwrap()), 2);
        assert!(h.can_undo() && h.can_redo());
        assert!(h.go_to(9).is_err());
        assert_eq!(h.position(), Some(1));
        h.reset();
        assert!(h.is_empty());
        assert_eq!(h.position(), None);
        assert_eq!(h.memory_usage(), 0);
    }

    #[test]
    fn memory_limit_evicts_oldest_but_keeps_one() {
        let mut h = HistoryStore::new(10).with_memory_limit(Some(20));
        // Each entry: 4 mask bytes + 4 thumbnail bytes.
        for tag in 1..=5 {
            push(&mut h, tag);
        }
        assert_eq!(h.len(), 2);
        assert_eq!(h.memory_usage(), 16);

        let mut tiny = HistoryStore::new(10).with_memory_limit(Some(1));
        push(&mut tiny, 1);
        push(&mut tiny, 2);
        assert_eq!(tiny.len(), 1);
        assert_eq!(tag_of(&tiny.current().unwrap().mask), 2);
    }

    #[test]
    fn strip_window_centres_on_position() {
        let mut h = HistoryStore::default();
        for tag in 0..10 {
            push(&mut h, tag);
        }
        assert_eq!(h.strip_window(4), 6..10);
        h.go_to(5).unwrap();
        assert_eq!(h.strip_window(4), 3..7);
        h.go_to(0).unwrap();
        assert_eq!(h.strip_window(4), 0..4);
        assert_eq!(h.strip_window(20), 0..10);
    }

    #[test]
    fn strip_slots_map_back_to_entries() {
        let mut h = HistoryStore::default();
        assert_eq!(h.strip_index(0, 4), None);
        for tag in 0..10 {
            push(&mut h, tag);
        }
        h.go_to(5).unwrap();
        assert_eq!(h.strip_index(0, 4), Some(3));
        assert_eq!(h.strip_index(3, 4), Some(6));
        assert_eq!(h.strip_index(4, 4), None);

        let index = h.strip_index(1, 4).unwrap();
        h.go_to(index).unwrap();
        assert_eq!(h.position(), Some(4));
    }
}
