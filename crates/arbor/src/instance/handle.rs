//! Generational handles into the instance arena.
//!
//! A destroyed instance's slot is recycled for the next one created, so a
//! bare index would silently start pointing at the new occupant. Each slot
//! carries a generation that is bumped on free:
//!
//! ```text
//! Instance { index: 3, generation: 0 }  ← created, then destroyed
//! Instance { index: 3, generation: 1 }  ← next instance in slot 3
//! ```
//!
//! The old handle still says `generation: 0`, so every tree operation on it
//! fails with [`InstanceDestroyed`](crate::Error::InstanceDestroyed) instead
//! of touching the wrong node.

use std::fmt;

/// A handle to an instance owned by an [`Engine`](crate::Engine).
///
/// Handles are `Copy` and cheap to store anywhere (in listeners, in other
/// instances' state). They are only meaningful for the engine that issued
/// them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Instance {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl Instance {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Slot bookkeeping for the arena: which generation each slot is on and
/// which slots are free.
#[derive(Default)]
pub(crate) struct HandleAllocator {
    generations: Vec<u32>,
    free: Vec<u32>,
}

impl HandleAllocator {
    pub fn allocate(&mut self) -> Instance {
        match self.free.pop() {
            Some(index) => Instance {
                index,
                generation: self.generations[index as usize],
            },
            None => {
                let index = self.generations.len() as u32;
                self.generations.push(0);
                Instance {
                    index,
                    generation: 0,
                }
            }
        }
    }

    /// Returns `false` for a handle that was already stale.
    pub fn free(&mut self, handle: Instance) -> bool {
        if !self.is_live(handle) {
            return false;
        }
        self.generations[handle.index as usize] = handle.generation.wrapping_add(1);
        self.free.push(handle.index);
        true
    }

    pub fn is_live(&self, handle: Instance) -> bool {
        self.generations
            .get(handle.index as usize)
            .is_some_and(|&g| g == handle.generation)
    }

    pub fn live_count(&self) -> usize {
        self.generations.len() - self.free.len()
    }

    /// Slots ever allocated, live or free.
    #[cfg(any(feature = "diagnostics", test))]
    pub fn slot_count(&self) -> usize {
        self.generations.len()
    }
}
