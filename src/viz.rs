// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 libarena contributors
//
// Visualization transport: a localhost TCP endpoint that streams arena
// layout snapshots to an external diagnostic tool.
//
// Protocol, all fields little-endian u32:
//
//   client → server : 1 request byte (value ignored)
//   server → client : arena_size, count, then count × (offset, length)
//
// One snapshot per request byte; the exchange ends when the client closes
// its half of the connection. The pool itself is never touched from another
// thread: the server asks a caller-provided closure for each snapshot, so
// the caller decides when and how the pool is read.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use log::debug;

use crate::capability::{LayoutEntry, Vizable};

/// Collect a layout snapshot from any [`Vizable`] container.
///
/// Returns `(arena_size, entries)` sized to the container's current block
/// population.
pub fn snapshot<V: Vizable>(viz: &V, max_entries: usize) -> (usize, Vec<LayoutEntry>) {
    let mut entries = vec![LayoutEntry::default(); max_entries];
    let count = viz.arena_layout(&mut entries);
    entries.truncate(count);
    (viz.arena_size(), entries)
}

/// The layout-streaming endpoint.
pub struct VizServer {
    listener: TcpListener,
}

impl VizServer {
    /// Bind the endpoint. Use port 0 to let the OS pick one.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        debug!("viz: listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    /// The address the endpoint is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Block until one client connects, then answer its snapshot requests
    /// until it disconnects. `snapshot` is called once per request byte.
    pub fn serve_client<F>(&self, mut snapshot: F) -> io::Result<()>
    where
        F: FnMut() -> (usize, Vec<LayoutEntry>),
    {
        let (mut stream, peer) = self.listener.accept()?;
        debug!("viz: client connected from {peer}");
        let mut request = [0u8; 1];
        loop {
            match stream.read(&mut request) {
                Ok(0) => {
                    debug!("viz: client {peer} disconnected");
                    return Ok(());
                }
                Ok(_) => {
                    let (arena_size, entries) = snapshot();
                    write_frame(&mut stream, arena_size, &entries)?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Serialize one layout frame.
pub fn write_frame<W: Write>(w: &mut W, arena_size: usize, entries: &[LayoutEntry]) -> io::Result<()> {
    let mut buf = Vec::with_capacity(8 + entries.len() * 8);
    buf.extend_from_slice(&(arena_size as u32).to_le_bytes());
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for entry in entries {
        buf.extend_from_slice(&(entry.offset as u32).to_le_bytes());
        buf.extend_from_slice(&(entry.length as u32).to_le_bytes());
    }
    w.write_all(&buf)
}

/// Deserialize one layout frame. This is the client half of the protocol,
/// used by diagnostic tools and the transport tests.
pub fn read_frame<R: Read>(r: &mut R) -> io::Result<(u32, Vec<LayoutEntry>)> {
    let mut header = [0u8; 8];
    r.read_exact(&mut header)?;
    let arena_size = u32::from_le_bytes(header[0..4].try_into().unwrap());
    let count = u32::from_le_bytes(header[4..8].try_into().unwrap());

    let mut entries = Vec::with_capacity(count as usize);
    let mut pair = [0u8; 8];
    for _ in 0..count {
        r.read_exact(&mut pair)?;
        entries.push(LayoutEntry {
            offset: u32::from_le_bytes(pair[0..4].try_into().unwrap()) as usize,
            length: u32::from_le_bytes(pair[4..8].try_into().unwrap()) as usize,
        });
    }
    Ok((arena_size, entries))
}

/// Request one snapshot over an open client connection.
pub fn request_snapshot(stream: &mut TcpStream) -> io::Result<(u32, Vec<LayoutEntry>)> {
    stream.write_all(&[1u8])?;
    read_frame(stream)
}
