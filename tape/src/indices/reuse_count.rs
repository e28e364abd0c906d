use descent_core::{Identifier, PASSIVE_INDEX};

use super::IndexManager;

// REUSE INDEX MANAGER WITH USE COUNTS
// ================================================================================================

/// Free-list identifier recycling with per-identifier use counts.
///
/// Copies increment the source identifier's count and share it, so a plain
/// copy assignment records nothing on the tape. An identifier returns to the
/// free list only when its last holder releases it. `assign` keeps the
/// current identifier when the caller is its sole holder, which makes
/// in-place updates (`t = t * t`) reuse the slot.
#[derive(Debug)]
pub struct ReuseCountIndexManager {
    reserved: Identifier,
    global_max: Identifier,
    current_max: Identifier,
    free_list: Vec<Identifier>,
    use_counts: Vec<u32>,
}

impl ReuseCountIndexManager {
    fn grow_use_counts(&mut self, id: Identifier) {
        let needed = id as usize + 1;
        if self.use_counts.len() < needed {
            let target = needed.max(self.use_counts.len() * 2).max(64);
            self.use_counts.resize(target, 0);
        }
    }
}

impl IndexManager for ReuseCountIndexManager {
    type Position = ();

    const IS_LINEAR: bool = false;
    const ASSIGN_NEEDS_STATEMENT: bool = false;

    fn new(reserved: Identifier) -> Self {
        Self {
            reserved,
            global_max: reserved,
            current_max: reserved,
            free_list: Vec::new(),
            use_counts: vec![0; reserved as usize + 1],
        }
    }

    fn create(&mut self) -> Identifier {
        let id = if let Some(id) = self.free_list.pop() {
            id
        } else {
            if self.global_max == self.current_max {
                self.global_max += 1;
            }
            self.current_max += 1;
            self.current_max
        };
        self.grow_use_counts(id);
        self.use_counts[id as usize] = 1;
        id
    }

    fn create_unused(&mut self) -> Identifier {
        self.global_max += 1;
        self.current_max = self.global_max;
        let id = self.global_max;
        self.grow_use_counts(id);
        self.use_counts[id as usize] = 1;
        id
    }

    fn free(&mut self, id: &mut Identifier) {
        if *id != PASSIVE_INDEX {
            let slot = &mut self.use_counts[*id as usize];
            *slot -= 1;
            if *slot == 0 {
                if *id == self.current_max {
                    self.current_max -= 1;
                } else {
                    self.free_list.push(*id);
                }
            }
            *id = PASSIVE_INDEX;
        }
    }

    fn assign(&mut self, id: &mut Identifier) {
        if *id == PASSIVE_INDEX {
            *id = self.create();
        } else if self.use_counts[*id as usize] > 1 {
            self.use_counts[*id as usize] -= 1;
            *id = self.create();
        }
    }

    fn copy_assign(&mut self, lhs: &mut Identifier, rhs: Identifier) {
        // lhs == rhs also guards self-assignment from deactivating the slot
        if *lhs != rhs {
            self.free(lhs);
            if rhs != PASSIVE_INDEX {
                self.use_counts[rhs as usize] += 1;
                *lhs = rhs;
            }
        }
    }

    #[inline(always)]
    fn max_live(&self) -> Identifier {
        self.global_max
    }

    fn position(&self) -> Self::Position {}

    fn reset_to(&mut self, _pos: Self::Position) {}

    fn reset(&mut self) {
        self.global_max = self.reserved;
        self.current_max = self.reserved;
        self.free_list.clear();
        self.use_counts.clear();
        self.use_counts.resize(self.reserved as usize + 1, 0);
    }

    fn free_count(&self) -> usize {
        self.free_list.len()
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_share_the_identifier() {
        let mut manager = ReuseCountIndexManager::new(0);
        let a = manager.create();
        let mut b = PASSIVE_INDEX;
        manager.copy_assign(&mut b, a);
        assert_eq!(b, a);

        // releasing one holder keeps the identifier alive
        let mut a = a;
        manager.free(&mut a);
        assert_eq!(manager.free_count(), 0);
        manager.free(&mut b);
        assert_eq!(manager.create(), 1);
    }

    #[test]
    fn assign_keeps_a_solely_held_identifier() {
        let mut manager = ReuseCountIndexManager::new(0);
        let mut id = manager.create();
        manager.assign(&mut id);
        assert_eq!(id, 1);
    }

    #[test]
    fn assign_detaches_from_a_shared_identifier() {
        let mut manager = ReuseCountIndexManager::new(0);
        let mut a = manager.create();
        let mut b = PASSIVE_INDEX;
        manager.copy_assign(&mut b, a);

        manager.assign(&mut b);
        assert_ne!(b, a);

        // the original holder is unaffected
        manager.free(&mut a);
        manager.free(&mut b);
    }

    #[test]
    fn self_copy_is_a_no_op() {
        let mut manager = ReuseCountIndexManager::new(0);
        let mut a = manager.create();
        let rhs = a;
        manager.copy_assign(&mut a, rhs);
        assert_eq!(a, 1);
        manager.assign(&mut a);
        assert_eq!(a, 1);
    }
}
