// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 libarena contributors
//
// Capability surfaces: the Caps report, layout reporting (feature
// "vizable") and free-buddy coalescing (feature "defrag").

use libarena::{BlockPool, Caps};

#[test]
fn caps_reflect_the_compiled_features() {
    let pool = BlockPool::<2048>::new();
    let caps = pool.capabilities();

    #[cfg(feature = "vizable")]
    assert!(caps.contains(Caps::VIZ));
    #[cfg(not(feature = "vizable"))]
    assert!(!caps.contains(Caps::VIZ));

    #[cfg(feature = "defrag")]
    assert!(caps.contains(Caps::DEFRAG));
    #[cfg(not(feature = "defrag"))]
    assert!(!caps.contains(Caps::DEFRAG));
}

#[cfg(feature = "vizable")]
mod layout {
    use libarena::{BlockPool, LayoutEntry, PoolConfig, Vizable};

    #[test]
    fn layout_reports_allocated_blocks_only() {
        let mut pool = BlockPool::<2048>::new();
        pool.init(&PoolConfig::new()).expect("init");
        let a = pool.alloc(1000).expect("a");
        let b = pool.alloc(100).expect("b");

        let mut out = [LayoutEntry::default(); 8];
        let count = pool.arena_layout(&mut out);
        assert_eq!(count, 2);
        assert_eq!(pool.arena_size(), 2048);

        let entries = &out[..count];
        assert!(entries.contains(&LayoutEntry { offset: a, length: 1024 }));
        assert!(entries.contains(&LayoutEntry { offset: b, length: 128 }));
    }

    #[test]
    fn layout_truncates_to_the_callers_buffer() {
        let mut pool = BlockPool::<2048>::new();
        pool.init(&PoolConfig::new()).expect("init");
        pool.alloc(1000).expect("a");
        pool.alloc(100).expect("b");

        let mut out = [LayoutEntry::default(); 1];
        assert_eq!(pool.arena_layout(&mut out), 1);

        let mut none: [LayoutEntry; 0] = [];
        assert_eq!(pool.arena_layout(&mut none), 0);
    }

    #[test]
    fn empty_pool_reports_an_empty_layout() {
        let mut pool = BlockPool::<2048>::new();
        pool.init(&PoolConfig::new()).expect("init");
        let mut out = [LayoutEntry::default(); 4];
        assert_eq!(pool.arena_layout(&mut out), 0);
    }
}

#[cfg(feature = "defrag")]
mod defrag {
    use libarena::{BlockPool, Defragable, PoolConfig};

    /// One 1024 block split all the way down by a 32-byte allocation.
    fn split_pool() -> (BlockPool<2048>, usize) {
        let config = PoolConfig::new()
            .initial_lens(&[1, 0, 0, 0, 0, 0])
            .expect("lens");
        let mut pool = BlockPool::<2048>::new();
        pool.init(&config).expect("init");
        let a = pool.alloc(32).expect("alloc");
        (pool, a)
    }

    #[test]
    fn coalescing_rebuilds_the_original_block() {
        let (mut pool, a) = split_pool();
        pool.free(a).expect("free");

        assert!(pool.is_fragmented());
        assert!(pool.defragment());
        assert!(!pool.is_fragmented());

        // Every buddy pair merged back up into the single 1024 block.
        assert_eq!(pool.descriptor_count(1024), Some(1));
        assert_eq!(pool.free_count(1024), Some(1));
        for size in [512, 256, 128, 64, 32] {
            assert_eq!(pool.descriptor_count(size), Some(0), "class {size}");
        }
        assert_eq!(pool.space_available(), 1024);
    }

    #[test]
    fn allocated_blocks_stop_the_merge() {
        let (mut pool, a) = split_pool();

        // The allocated block's sibling has no free buddy, so nothing merges.
        assert!(!pool.is_fragmented());
        assert!(pool.defragment());
        assert_eq!(pool.descriptor_count(32), Some(2));
        assert!(pool.is_allocated(a));
        assert_eq!(pool.space_available(), 1024 - 32);
    }

    #[test]
    fn uninitialized_pool_cannot_defragment() {
        let mut pool = BlockPool::<2048>::new();
        assert!(!pool.is_fragmented());
        assert!(!pool.defragment());
    }
}
