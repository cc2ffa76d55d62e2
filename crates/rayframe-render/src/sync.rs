// SPDX-License-Identifier: CEPL-1.0
//! Frames-in-flight bookkeeping.
//!
//! The ring of frame slots is fixed at [`FRAMES_IN_FLIGHT`] and is the only
//! back-pressure point of the loop: a slot is reused only after its fence has
//! been waited on. Swapchain images are tracked separately because the image
//! count and the slot count differ; each image remembers the fence of the
//! submission that last used it.

/// Number of frame slots in the ring.
pub const FRAMES_IN_FLIGHT: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotRef<F> {
    pub index: usize,
    pub fence: F,
}

#[derive(Debug)]
pub struct FrameSynchronizer<F> {
    slot_fences: Vec<F>,
    current: usize,
    images_in_flight: Vec<Option<F>>,
}

impl<F: Copy + Eq> FrameSynchronizer<F> {
    /// `slot_fences` is the identity of the ring, one fence per slot.
    pub fn new(slot_fences: Vec<F>, image_count: usize) -> Self {
        assert!(!slot_fences.is_empty(), "frame ring needs at least one slot");
        Self {
            slot_fences,
            current: 0,
            images_in_flight: vec![None; image_count],
        }
    }

    /// The slot the next frame will use.
    pub fn acquire_slot(&self) -> SlotRef<F> {
        SlotRef {
            index: self.current,
            fence: self.slot_fences[self.current],
        }
    }

    /// Marks `image_index` as owned by the current slot and returns the fence
    /// of a *different* slot that still may be using it.
    pub fn claim_image(&mut self, image_index: u32) -> Option<F> {
        let current = self.slot_fences[self.current];
        let owner = &mut self.images_in_flight[image_index as usize];
        let previous = owner.replace(current);
        previous.filter(|&f| f != current)
    }

    /// Moves to the next slot. Called once per submitted frame.
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slot_fences.len();
    }

    /// Forgets image ownership after the swapchain was rebuilt (the device is
    /// idle at that point). Slot identities are kept.
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, None);
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slot_fences.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn slot_fences(&self) -> &[F] {
        &self.slot_fences
    }

    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }

    pub fn image_owner(&self, image_index: u32) -> Option<F> {
        self.images_in_flight
            .get(image_index as usize)
            .copied()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_advances_modulo_slot_count() {
        let mut sync = FrameSynchronizer::new(vec![10, 11], 3);
        let seen: Vec<_> = (0..5)
            .map(|_| {
                let s = sync.acquire_slot();
                sync.advance();
                s.index
            })
            .collect();
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn fresh_image_has_no_previous_owner() {
        let mut sync = FrameSynchronizer::new(vec![10, 11], 3);
        assert_eq!(sync.claim_image(2), None);
        assert_eq!(sync.image_owner(2), Some(10));
    }

    #[test]
    fn claim_reports_fence_actually_last_used_not_index_mod_slots() {
        // 3 images, 2 slots. Image 2 first used by slot 0, then requested
        // again from slot 1: must wait on slot 0's fence (10), not 2 % 2.
        let mut sync = FrameSynchronizer::new(vec![10, 11], 3);
        assert_eq!(sync.claim_image(2), None);
        sync.advance();
        assert_eq!(sync.claim_image(2), Some(10));
        sync.advance();
        // back on slot 0, image 2 now belongs to slot 1
        assert_eq!(sync.claim_image(2), Some(11));
    }

    #[test]
    fn same_slot_reuse_needs_no_extra_wait() {
        let mut sync = FrameSynchronizer::new(vec![10], 2);
        assert_eq!(sync.claim_image(0), None);
        sync.advance();
        assert_eq!(sync.claim_image(0), None);
    }

    #[test]
    fn reset_images_keeps_ring_identity() {
        let mut sync = FrameSynchronizer::new(vec![10, 11], 3);
        sync.claim_image(0);
        sync.advance();
        sync.reset_images(4);
        assert_eq!(sync.slot_fences(), &[10, 11]);
        assert_eq!(sync.current_index(), 1);
        assert_eq!(sync.image_count(), 4);
        assert_eq!(sync.image_owner(0), None);
    }
}
