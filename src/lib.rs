// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 libarena contributors
//
// Segregated-fit block pool over a single fixed arena.
//
// The pool keeps one free list per power-of-two size class and serves each
// request from the smallest class that fits, splitting a larger free block
// down through the classes when no exact match exists. Intended for hosts
// where a deterministic layout and a small footprint matter more than peak
// throughput. Single-threaded; the host supplies any locking.

mod arena;
pub use arena::Arena;

mod class;

pub mod config;
pub use config::{ConfigError, PoolConfig, DEFAULT_CLASSES};

mod pool;
pub use pool::{BlockPool, PoolError};

pub mod capability;
pub use capability::{Caps, Defragable, LayoutEntry, Vizable};

#[cfg(feature = "vizable")]
pub mod viz;
