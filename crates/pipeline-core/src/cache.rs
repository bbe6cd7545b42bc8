//! Per-tick frame cache

use video_pipeline_common::SharedFrame;

/// Fixed arena of node outputs, indexed by topological slot
///
/// Each slot is written at most once per tick and cleared on [`FrameCache::reset`].
#[derive(Debug)]
pub struct FrameCache {
    slots: Vec<Option<SharedFrame>>,
}

impl FrameCache {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }

    pub fn put(&mut self, slot: usize, frame: SharedFrame) {
        debug_assert!(self.slots[slot].is_none(), "slot {slot} written twice");
        self.slots[slot] = Some(frame);
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&SharedFrame> {
        self.slots.get(slot)?.as_ref()
    }

    #[must_use]
    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use video_pipeline_common::Frame;

    #[test]
    fn test_reset_clears_all_slots() {
        let mut cache = FrameCache::new(3);
        cache.put(0, Arc::new(Frame::new(2, 2)));
        cache.put(2, Arc::new(Frame::new(2, 2)));
        assert_eq!(cache.filled(), 2);
        assert!(cache.get(1).is_none());

        cache.reset();
        assert_eq!(cache.filled(), 0);
        cache.put(0, Arc::new(Frame::new(4, 4)));
        assert_eq!(cache.get(0).unwrap().dimensions(), (4, 4));
    }

    #[test]
    fn test_out_of_range_slot() {
        let cache = FrameCache::new(1);
        assert!(cache.get(5).is_none());
    }
}
