// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 libarena contributors
//
// The segregated-fit block pool.
//
// One free list per power-of-two size class over a single fixed arena.
// Requests are served from the smallest class that fits; when that class has
// no free block, the nearest larger free block is split down through every
// intermediate class. Block identity is the exact start offset; lookup is a
// linear scan over all live descriptors.
//
// Single-threaded. The host provides mutual exclusion if the pool is shared
// across threads or interrupt contexts.

use std::error::Error;
use std::fmt;

use log::{debug, trace};

use crate::arena::Arena;
use crate::class::{BlockDesc, ClassTable};
use crate::config::{ConfigError, PoolConfig};

/// Failure surfaced by the pool's allocation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The pool has not been initialized yet.
    NotInitialized,
    /// The request exceeds the largest class size.
    TooLarge,
    /// The request exceeds the bytes currently available.
    OutOfSpace,
    /// Enough bytes are free, but no block could be found or synthesized.
    Fragmented,
    /// No block starts at the given offset.
    NotABlock,
    /// The block at the given offset is already free.
    AlreadyFree,
    /// Reallocation could not find a new block; the old block is untouched.
    ReallocNoSpace,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::NotInitialized => write!(f, "pool is not initialized"),
            PoolError::TooLarge => write!(f, "request exceeds the largest class size"),
            PoolError::OutOfSpace => write!(f, "request exceeds the available space"),
            PoolError::Fragmented => write!(f, "no block could be found or synthesized"),
            PoolError::NotABlock => write!(f, "no block starts at this offset"),
            PoolError::AlreadyFree => write!(f, "block is already free"),
            PoolError::ReallocNoSpace => {
                write!(f, "no new block available; the old block is untouched")
            }
        }
    }
}

impl Error for PoolError {}

/// A segregated-fit block pool over an `N`-byte arena.
///
/// Two-phase lifecycle: [`BlockPool::new`] produces an empty handle, and
/// [`BlockPool::init`] partitions the arena into per-class blocks. Every
/// operation on an uninitialized pool returns [`PoolError::NotInitialized`].
///
/// Offsets returned by [`alloc`] are byte offsets into the arena and are the
/// block's identity: [`free`], [`realloc`] and [`is_allocated`] match the
/// exact start offset only.
///
/// [`alloc`]: BlockPool::alloc
/// [`free`]: BlockPool::free
/// [`realloc`]: BlockPool::realloc
/// [`is_allocated`]: BlockPool::is_allocated
pub struct BlockPool<const N: usize> {
    arena: Arena<N>,
    classes: Vec<ClassTable>,
    space_available: usize,
    initialized: bool,
}

impl<const N: usize> BlockPool<N> {
    /// Create an uninitialized pool.
    pub const fn new() -> Self {
        Self {
            arena: Arena::new(),
            classes: Vec::new(),
            space_available: 0,
            initialized: false,
        }
    }

    /// Partition the arena according to `config`.
    ///
    /// The default partition is greedy largest-first: each class, in
    /// descending order, claims as many whole blocks as fit in the bytes the
    /// larger classes left behind. The tail residue smaller than the smallest
    /// class stays unusable. An explicit initial distribution in `config`
    /// replaces the greedy partition and is checked against per-class
    /// capacity and arena coverage.
    ///
    /// After a successful return every descriptor is free and
    /// [`space_available`](BlockPool::space_available) equals the total
    /// partitioned bytes.
    pub fn init(&mut self, config: &PoolConfig) -> Result<(), ConfigError> {
        if self.initialized {
            return Err(ConfigError::AlreadyInitialized);
        }

        let mut tables: Vec<ClassTable> = config
            .classes()
            .iter()
            .map(|&size| ClassTable::with_block_size(size, N))
            .collect();

        let mut cursor = 0usize;
        match config.lens() {
            Some(lens) => {
                for (table, &want) in tables.iter_mut().zip(lens) {
                    if want > table.capacity() {
                        return Err(ConfigError::CapacityExceeded(table.block_size()));
                    }
                    for _ in 0..want {
                        if cursor + table.block_size() > N {
                            return Err(ConfigError::ArenaOverflow);
                        }
                        table.push(BlockDesc {
                            offset: cursor,
                            is_free: true,
                        });
                        cursor += table.block_size();
                    }
                }
            }
            None => {
                for table in tables.iter_mut() {
                    let count = (N - cursor) / table.block_size();
                    for _ in 0..count {
                        table.push(BlockDesc {
                            offset: cursor,
                            is_free: true,
                        });
                        cursor += table.block_size();
                    }
                }
            }
        }

        self.classes = tables;
        self.space_available = cursor;
        self.initialized = true;

        debug!(
            "pool: initialized, arena={N} usable={} classes={:?}",
            cursor,
            self.classes
                .iter()
                .map(|t| (t.block_size(), t.len()))
                .collect::<Vec<_>>()
        );
        self.assert_integrity();
        Ok(())
    }

    /// Allocate a block of at least `len` bytes.
    ///
    /// The block comes from the smallest class whose size is `>= len`, so the
    /// wasted tail is always less than half the block. Returns the block's
    /// start offset.
    pub fn alloc(&mut self, len: usize) -> Result<usize, PoolError> {
        if !self.initialized {
            return Err(PoolError::NotInitialized);
        }
        let target = self.select_class(len).ok_or(PoolError::TooLarge)?;
        if len > self.space_available {
            debug!("alloc: len={len} exceeds available {}", self.space_available);
            return Err(PoolError::OutOfSpace);
        }

        let size = self.classes[target].block_size();

        // Direct hit: first free block of the class, scanning from the front.
        if let Some(idx) = self.classes[target].first_free() {
            let desc = self.classes[target].desc_mut(idx);
            desc.is_free = false;
            let offset = desc.offset;
            self.space_available -= size;
            trace!("alloc: len={len} class={size} offset={offset}");
            self.assert_integrity();
            return Ok(offset);
        }

        // Split path: nearest larger class holding a free block, taking the
        // rightmost free descriptor so the low addresses stay packed.
        let donor = (0..target)
            .rev()
            .find_map(|c| self.classes[c].rightmost_free().map(|idx| (c, idx)));
        let Some((donor_class, donor_idx)) = donor else {
            debug!("alloc: len={len} class={size} fragmented");
            return Err(PoolError::Fragmented);
        };

        let offset = self.split(donor_class, donor_idx, target);
        self.space_available -= size;
        trace!(
            "alloc: len={len} class={size} offset={offset} (split from class {})",
            self.classes[donor_class].block_size()
        );
        self.assert_integrity();
        Ok(offset)
    }

    /// Release the block that starts exactly at `offset`.
    ///
    /// Offsets interior to a block are rejected with
    /// [`PoolError::NotABlock`]; releasing a block twice reports
    /// [`PoolError::AlreadyFree`]. Neither changes any state.
    pub fn free(&mut self, offset: usize) -> Result<(), PoolError> {
        if !self.initialized {
            return Err(PoolError::NotInitialized);
        }
        let (class, idx) = self.find_block(offset).ok_or(PoolError::NotABlock)?;
        if self.classes[class].desc(idx).is_free {
            return Err(PoolError::AlreadyFree);
        }
        self.classes[class].desc_mut(idx).is_free = true;
        let size = self.classes[class].block_size();
        self.space_available += size;
        trace!("free: offset={offset} class={size}");
        self.assert_integrity();
        Ok(())
    }

    /// Resize the block at `offset` to hold at least `len` bytes.
    ///
    /// Returns `Ok(Some(offset))` unchanged when `len` still selects the
    /// block's current class, `Ok(None)` when `len == 0` (the block is
    /// freed), and `Ok(Some(new_offset))` after a move. On a move the first
    /// `min(old_block_size, len)` bytes are copied and the old block is
    /// freed. When no new block can be had the old block stays intact and the
    /// error is [`PoolError::ReallocNoSpace`] (or [`PoolError::TooLarge`]
    /// when `len` exceeds the largest class).
    pub fn realloc(&mut self, offset: usize, len: usize) -> Result<Option<usize>, PoolError> {
        if !self.initialized {
            return Err(PoolError::NotInitialized);
        }
        let (class, idx) = self.find_block(offset).ok_or(PoolError::NotABlock)?;
        if self.classes[class].desc(idx).is_free {
            return Err(PoolError::AlreadyFree);
        }
        if len == 0 {
            self.free(offset)?;
            return Ok(None);
        }

        let current_size = self.classes[class].block_size();
        match self.select_class(len) {
            Some(target) if target == class => return Ok(Some(offset)),
            Some(_) => {}
            None => return Err(PoolError::TooLarge),
        }

        let new_offset = match self.alloc(len) {
            Ok(o) => o,
            Err(PoolError::TooLarge) => return Err(PoolError::TooLarge),
            Err(_) => return Err(PoolError::ReallocNoSpace),
        };
        self.arena.copy(offset, new_offset, current_size.min(len));
        self.free(offset)?;
        debug!("realloc: moved offset={offset} to {new_offset} for len={len}");
        self.assert_integrity();
        Ok(Some(new_offset))
    }

    /// Whether a block starts exactly at `offset` and is currently allocated.
    /// Always false on an uninitialized pool.
    pub fn is_allocated(&self, offset: usize) -> bool {
        match self.find_block(offset) {
            Some((class, idx)) => !self.classes[class].desc(idx).is_free,
            None => false,
        }
    }

    /// Bytes currently available for allocation.
    pub fn space_available(&self) -> usize {
        self.space_available
    }

    /// Total arena size in bytes.
    pub const fn arena_size(&self) -> usize {
        N
    }

    /// Bytes the default partition can manage: the arena minus the tail
    /// residue smaller than the smallest class.
    pub fn usable_size(&self) -> usize {
        match self.classes.last() {
            Some(table) => N - N % table.block_size(),
            None => 0,
        }
    }

    /// The bytes of the allocated block starting at `offset`, spanning the
    /// whole class size. `None` if no allocated block starts there.
    pub fn data(&self, offset: usize) -> Option<&[u8]> {
        let (class, idx) = self.find_block(offset)?;
        if self.classes[class].desc(idx).is_free {
            return None;
        }
        Some(self.arena.slice(offset, self.classes[class].block_size()))
    }

    /// Mutable bytes of the allocated block starting at `offset`.
    pub fn data_mut(&mut self, offset: usize) -> Option<&mut [u8]> {
        let (class, idx) = self.find_block(offset)?;
        if self.classes[class].desc(idx).is_free {
            return None;
        }
        let size = self.classes[class].block_size();
        Some(self.arena.slice_mut(offset, size))
    }

    /// Number of live descriptors in the class of `block_size` bytes.
    /// `None` if no such class is configured.
    pub fn descriptor_count(&self, block_size: usize) -> Option<usize> {
        self.table_of(block_size).map(ClassTable::len)
    }

    /// Number of free descriptors in the class of `block_size` bytes.
    pub fn free_count(&self, block_size: usize) -> Option<usize> {
        self.table_of(block_size).map(ClassTable::free_len)
    }

    /// Total live descriptors across all classes.
    pub fn block_count(&self) -> usize {
        self.classes.iter().map(ClassTable::len).sum()
    }

    /// Whether [`init`](BlockPool::init) has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[cfg(feature = "vizable")]
    pub(crate) fn tables(&self) -> &[ClassTable] {
        &self.classes
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Index of the smallest class whose size fits `len`.
    /// `None` when `len` exceeds the largest class.
    fn select_class(&self, len: usize) -> Option<usize> {
        let mut fit = None;
        for (idx, table) in self.classes.iter().enumerate() {
            if table.block_size() < len {
                break;
            }
            fit = Some(idx);
        }
        fit
    }

    /// Split the free donor block down to `target`, one halving per class.
    ///
    /// Each intermediate class keeps the free upper half at its tail; the
    /// target class gains the lower half (allocated) and its free sibling.
    /// Returns the allocated block's offset.
    fn split(&mut self, donor_class: usize, donor_idx: usize, target: usize) -> usize {
        let donor = self.classes[donor_class].remove(donor_idx);
        debug_assert!(donor.is_free);
        let offset = donor.offset;

        for class in donor_class + 1..target {
            let half = self.classes[class].block_size();
            self.classes[class].push(BlockDesc {
                offset: offset + half,
                is_free: true,
            });
            trace!("split: class {} keeps free upper half at {}", half, offset + half);
        }

        let size = self.classes[target].block_size();
        self.classes[target].push(BlockDesc {
            offset,
            is_free: false,
        });
        self.classes[target].push(BlockDesc {
            offset: offset + size,
            is_free: true,
        });
        offset
    }

    /// Locate the descriptor whose start offset equals `offset` exactly.
    ///
    /// Release builds return at the first hit. Debug builds scan every
    /// descriptor and assert that the offset is unique.
    fn find_block(&self, offset: usize) -> Option<(usize, usize)> {
        let mut hit = None;
        for (class, table) in self.classes.iter().enumerate() {
            for (idx, desc) in table.iter().enumerate() {
                if desc.offset != offset {
                    continue;
                }
                if !cfg!(debug_assertions) {
                    return Some((class, idx));
                }
                assert!(hit.is_none(), "duplicate descriptor for offset {offset}");
                hit = Some((class, idx));
            }
        }
        hit
    }

    fn table_of(&self, block_size: usize) -> Option<&ClassTable> {
        self.classes.iter().find(|t| t.block_size() == block_size)
    }

    /// Debug-build integrity check: capacity bounds, in-arena ranges,
    /// pairwise non-overlap and exact space accounting.
    fn assert_integrity(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        let mut ranges: Vec<(usize, usize)> = Vec::with_capacity(self.block_count());
        let mut free_bytes = 0usize;
        for table in &self.classes {
            assert!(table.len() <= table.capacity());
            for desc in table.iter() {
                assert!(desc.offset + table.block_size() <= N);
                ranges.push((desc.offset, desc.offset + table.block_size()));
                if desc.is_free {
                    free_bytes += table.block_size();
                }
            }
        }
        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            assert!(
                pair[0].1 <= pair[1].0,
                "descriptors overlap: {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
        assert_eq!(free_bytes, self.space_available, "space accounting drifted");
    }
}

impl<const N: usize> Default for BlockPool<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for BlockPool<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockPool")
            .field("arena_size", &N)
            .field("initialized", &self.initialized)
            .field("space_available", &self.space_available)
            .field("classes", &self.classes)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Free-buddy coalescing (feature = "defrag")
// ---------------------------------------------------------------------------

#[cfg(feature = "defrag")]
impl<const N: usize> BlockPool<N> {
    /// Merge free buddy pairs upward through the classes until none remain.
    /// Returns the number of merges performed. Allocated blocks never move.
    pub(crate) fn coalesce(&mut self) -> usize {
        let mut merges = 0;
        // Smallest class first, so merged blocks can merge again one class up.
        for class in (1..self.classes.len()).rev() {
            while self.merge_one_pair(class) {
                merges += 1;
            }
        }
        if merges > 0 {
            debug!("defrag: merged {merges} buddy pairs");
        }
        self.assert_integrity();
        merges
    }

    /// Whether at least one free buddy pair could be merged right now.
    pub(crate) fn mergeable_pair_exists(&self) -> bool {
        (1..self.classes.len()).any(|class| self.find_buddy_pair(class).is_some())
    }

    /// Merge one free buddy pair of `class` into the next-larger class.
    fn merge_one_pair(&mut self, class: usize) -> bool {
        let Some((low, high)) = self.find_buddy_pair(class) else {
            return false;
        };
        let offset = self.classes[class].desc(low).offset;
        // Remove the higher index first so the lower one stays valid.
        self.classes[class].remove(low.max(high));
        self.classes[class].remove(low.min(high));
        self.classes[class - 1].push(BlockDesc {
            offset,
            is_free: true,
        });
        true
    }

    /// Find two free descriptors of `class` forming a buddy pair: adjacent,
    /// with the lower offset aligned to twice the class size, and with spare
    /// capacity in the class above.
    fn find_buddy_pair(&self, class: usize) -> Option<(usize, usize)> {
        let table = &self.classes[class];
        let size = table.block_size();
        if self.classes[class - 1].len() >= self.classes[class - 1].capacity() {
            return None;
        }
        for (low, desc) in table.iter().enumerate() {
            if !desc.is_free || desc.offset % (2 * size) != 0 {
                continue;
            }
            let buddy = table
                .iter()
                .position(|d| d.is_free && d.offset == desc.offset + size);
            if let Some(high) = buddy {
                return Some((low, high));
            }
        }
        None
    }
}
