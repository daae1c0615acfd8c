// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 libarena contributors
//
// Usage:
//   demo_viz <port>
//
// Drives a 4 KiB pool through a deterministic alloc/free/realloc mix and
// serves layout snapshots on 127.0.0.1:<port>. Connect with any client that
// speaks the viz frame protocol (one request byte per snapshot); the layout
// changes a little between client sessions. Stop with Ctrl-C.

use libarena::viz::{snapshot, VizServer};
use libarena::{BlockPool, PoolConfig};

const ARENA: usize = 4096;

/// Tiny deterministic generator so runs are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

/// A handful of allocations and releases to keep the layout interesting.
fn churn(pool: &mut BlockPool<ARENA>, rng: &mut Lcg, live: &mut Vec<usize>) {
    for _ in 0..8 {
        if rng.next() % 3 != 0 || live.is_empty() {
            let len = 16 + (rng.next() % 900) as usize;
            match pool.alloc(len) {
                Ok(offset) => live.push(offset),
                Err(e) => println!("alloc({len}): {e}"),
            }
        } else {
            let offset = live.swap_remove((rng.next() as usize) % live.len());
            if rng.next() % 4 == 0 {
                match pool.realloc(offset, 16 + (rng.next() % 900) as usize) {
                    Ok(Some(moved)) => live.push(moved),
                    Ok(None) => {}
                    Err(e) => {
                        println!("realloc({offset}): {e}");
                        live.push(offset);
                    }
                }
            } else if let Err(e) = pool.free(offset) {
                println!("free({offset}): {e}");
            }
        }
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: demo_viz <port>");
        std::process::exit(1);
    }
    let port: u16 = args[1].parse().unwrap_or_else(|_| {
        eprintln!("demo_viz: bad port '{}'", args[1]);
        std::process::exit(1);
    });

    let mut pool = BlockPool::<ARENA>::new();
    pool.init(&PoolConfig::new()).expect("init pool");
    println!(
        "pool ready: arena={} usable={} capabilities={:?}",
        pool.arena_size(),
        pool.usable_size(),
        pool.capabilities()
    );

    let mut rng = Lcg(0x5eed);
    let mut live = Vec::new();
    churn(&mut pool, &mut rng, &mut live);

    let server = VizServer::bind(("127.0.0.1", port)).expect("bind viz endpoint");
    println!("serving layout on {}", server.local_addr().expect("local addr"));

    loop {
        let max_entries = pool.block_count();
        if let Err(e) = server.serve_client(|| snapshot(&pool, max_entries)) {
            eprintln!("viz client error: {e}");
        }
        churn(&mut pool, &mut rng, &mut live);
        println!(
            "client done; churned layout, space_available={}",
            pool.space_available()
        );
    }
}
