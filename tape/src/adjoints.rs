use descent_core::{Identifier, PASSIVE_INDEX};

// ADJOINT VECTOR
// ================================================================================================

/// Dense gradient accumulators keyed by identifier.
///
/// The vector grows on demand with amortized doubling; entry 0 belongs to the
/// passive index and always reads as zero. During reverse sweeps the same
/// storage holds adjoints; during forward sweeps it holds tangents.
#[derive(Debug)]
pub struct AdjointVector<G> {
    slots: Vec<G>,
}

impl<G: Copy + Default> AdjointVector<G> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Grows the vector so that every identifier up to `max_id` is
    /// addressable.
    pub fn ensure(&mut self, max_id: Identifier) {
        let needed = max_id as usize + 1;
        if self.slots.len() < needed {
            let target = needed.max(self.slots.len() * 2).max(64);
            self.slots.resize(target, G::default());
        }
    }

    /// Zeroes every slot.
    pub fn clear(&mut self) {
        self.slots.fill(G::default());
    }

    /// Reads the slot of `id`; identifiers beyond the current size read as
    /// zero.
    #[inline(always)]
    pub fn get(&self, id: Identifier) -> G {
        self.slots.get(id as usize).copied().unwrap_or_default()
    }

    /// Writes the slot of `id`, growing if necessary. Writes to the passive
    /// index are discarded.
    pub fn set(&mut self, id: Identifier, value: G) {
        if id == PASSIVE_INDEX {
            return;
        }
        self.ensure(id);
        self.slots[id as usize] = value;
    }

    /// The raw slot storage, for the sweep loops.
    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [G] {
        &mut self.slots
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[G] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn allocated_bytes(&self) -> usize {
        self.slots.capacity() * size_of::<G>()
    }
}

impl<G: Copy + Default> Default for AdjointVector<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: Copy + Default + core::ops::AddAssign> AdjointVector<G> {
    /// Accumulates `update` into the slot of `id`. Partials propagated to the
    /// passive index are discarded.
    #[inline(always)]
    pub fn accumulate(&mut self, id: Identifier, update: G) {
        if id == PASSIVE_INDEX {
            return;
        }
        debug_assert!((id as usize) < self.slots.len());
        self.slots[id as usize] += update;
    }
}

// TESTS
// ================================================================================================
