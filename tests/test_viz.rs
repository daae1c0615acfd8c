// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 libarena contributors
//
// Transport round-trip for the visualization endpoint.

#![cfg(feature = "vizable")]

use std::io::Cursor;
use std::net::TcpStream;
use std::thread;

use libarena::viz::{self, VizServer};
use libarena::{BlockPool, LayoutEntry, PoolConfig};

#[test]
fn frame_round_trip() {
    let entries = [
        LayoutEntry { offset: 0, length: 1024 },
        LayoutEntry { offset: 1024, length: 128 },
    ];
    let mut wire = Vec::new();
    viz::write_frame(&mut wire, 2048, &entries).expect("write");
    assert_eq!(wire.len(), 8 + entries.len() * 8);

    let (arena_size, decoded) = viz::read_frame(&mut Cursor::new(wire)).expect("read");
    assert_eq!(arena_size, 2048);
    assert_eq!(decoded, entries);
}

#[test]
fn empty_frame_round_trip() {
    let mut wire = Vec::new();
    viz::write_frame(&mut wire, 512, &[]).expect("write");
    let (arena_size, decoded) = viz::read_frame(&mut Cursor::new(wire)).expect("read");
    assert_eq!(arena_size, 512);
    assert!(decoded.is_empty());
}

#[test]
fn server_streams_snapshots_on_request() {
    let mut pool = BlockPool::<2048>::new();
    pool.init(&PoolConfig::new()).expect("init");
    let a = pool.alloc(1000).expect("a");
    let b = pool.alloc(100).expect("b");

    let server = VizServer::bind("127.0.0.1:0").expect("bind");
    let addr = server.local_addr().expect("addr");

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).expect("connect");
        let first = viz::request_snapshot(&mut stream).expect("snapshot 1");
        let second = viz::request_snapshot(&mut stream).expect("snapshot 2");
        (first, second)
    });

    let max_entries = pool.block_count();
    server
        .serve_client(|| viz::snapshot(&pool, max_entries))
        .expect("serve");

    let ((size1, entries1), (size2, entries2)) = client.join().expect("client");
    assert_eq!(size1, 2048);
    assert_eq!((size1, &entries1), (size2, &entries2));
    assert_eq!(entries1.len(), 2);
    assert!(entries1.contains(&LayoutEntry { offset: a, length: 1024 }));
    assert!(entries1.contains(&LayoutEntry { offset: b, length: 128 }));
}
