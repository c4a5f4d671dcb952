/// Write access to one ring slot, obtained from [`TextureRing::acquire_write_slot`].
///
/// Not `Clone`: a handle is consumed by [`TextureRing::publish`], so a slot
/// cannot be published twice from the same acquisition.
#[derive(Debug)]
pub struct SlotHandle {
    index: usize,
}

impl SlotHandle {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// A fixed pool of display buffers rotated between the decode step and the
/// draw step.
///
/// At most one slot is published (visible) at a time. Write slots are never
/// handed out for the published index, so a frame being prepared cannot
/// overwrite the one being drawn. Publishing is a single index swap.
pub struct TextureRing<T> {
    slots: Vec<T>,
    published: Option<usize>,
    next: usize,
}

impl<T> TextureRing<T> {
    /// Builds a ring over `slots`. Returns `None` for fewer than two slots,
    /// which could not keep the write slot apart from the visible one.
    pub fn new(slots: Vec<T>) -> Option<Self> {
        if slots.len() < 2 {
            return None;
        }
        Some(Self {
            slots,
            published: None,
            next: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the next slot in rotation, skipping the published one.
    pub fn acquire_write_slot(&mut self) -> SlotHandle {
        let len = self.slots.len();
        let mut index = self.next % len;
        if self.published == Some(index) {
            index = (index + 1) % len;
        }
        self.next = (index + 1) % len;
        SlotHandle { index }
    }

    pub fn slot_mut(&mut self, handle: &SlotHandle) -> &mut T {
        &mut self.slots[handle.index]
    }

    /// Makes the handle's slot the visible one.
    pub fn publish(&mut self, handle: SlotHandle) {
        self.published = Some(handle.index);
    }

    pub fn published(&self) -> Option<&T> {
        self.published.map(|index| &self.slots[index])
    }

    pub fn published_index(&self) -> Option<usize> {
        self.published
    }

    /// Consumes the ring and returns every slot for release.
    pub fn drain(self) -> Vec<T> {
        self.slots
    }
}
