// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 libarena contributors
//
// Capability surfaces a poolable container can offer to collaborators:
// layout reporting (Vizable) and defragmentation (Defragable). The pool
// implements each one only when the matching feature is compiled in;
// `BlockPool::capabilities` reports which surfaces a build provides.

use bitflags::bitflags;

use crate::pool::BlockPool;

bitflags! {
    /// The capability surfaces compiled into this build.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Caps: u8 {
        /// Layout reporting ([`Vizable`]).
        const VIZ = 1 << 0;
        /// Defragmentation ([`Defragable`]).
        const DEFRAG = 1 << 1;
    }
}

/// One allocated block in a layout report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutEntry {
    /// Start offset of the block within the arena.
    pub offset: usize,
    /// Block length in bytes (the class size).
    pub length: usize,
}

/// Layout reporting: lets a collaborator inspect which bytes of the arena
/// are currently allocated.
pub trait Vizable {
    /// Fill `out` with one entry per allocated block, largest class first,
    /// and return the number of entries written. When `out` is too small the
    /// report is truncated to its length.
    fn arena_layout(&self, out: &mut [LayoutEntry]) -> usize;

    /// Total arena size in bytes.
    fn arena_size(&self) -> usize;
}

/// Defragmentation: lets a collaborator ask a container to reshape its free
/// space.
///
/// Callers holding references into the container must have registered update
/// callbacks for them before invoking [`defragment`], because an
/// implementation is allowed to move allocated blocks.
///
/// [`defragment`]: Defragable::defragment
pub trait Defragable {
    /// Whether a [`defragment`](Defragable::defragment) call would change
    /// anything right now.
    fn is_fragmented(&self) -> bool;

    /// Reshape the free space. Returns false when the container is not in a
    /// state where defragmentation can run.
    fn defragment(&mut self) -> bool;
}

impl<const N: usize> BlockPool<N> {
    /// The capability surfaces this build of the pool provides.
    pub fn capabilities(&self) -> Caps {
        let mut caps = Caps::empty();
        if cfg!(feature = "vizable") {
            caps |= Caps::VIZ;
        }
        if cfg!(feature = "defrag") {
            caps |= Caps::DEFRAG;
        }
        caps
    }
}

#[cfg(feature = "vizable")]
impl<const N: usize> Vizable for BlockPool<N> {
    fn arena_layout(&self, out: &mut [LayoutEntry]) -> usize {
        let mut written = 0;
        for table in self.tables() {
            for desc in table.iter() {
                if desc.is_free {
                    continue;
                }
                if written == out.len() {
                    return written;
                }
                out[written] = LayoutEntry {
                    offset: desc.offset,
                    length: table.block_size(),
                };
                written += 1;
            }
        }
        written
    }

    fn arena_size(&self) -> usize {
        N
    }
}

#[cfg(feature = "defrag")]
impl<const N: usize> Defragable for BlockPool<N> {
    fn is_fragmented(&self) -> bool {
        self.is_initialized() && self.mergeable_pair_exists()
    }

    /// Coalesce free buddy pairs upward through the classes. Allocated
    /// blocks never move, so no reference updates are needed for this
    /// implementation.
    fn defragment(&mut self) -> bool {
        if !self.is_initialized() {
            return false;
        }
        self.coalesce();
        true
    }
}
