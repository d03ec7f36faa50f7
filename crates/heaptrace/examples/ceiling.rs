//! Grows the heap until the tracker's ceiling is crossed. The process dumps the peak snapshot
//! and aborts.

use heaptrace::{StdPlatform, Tracker, TrackerConfig, TracingAllocator};
use std::alloc::System;

static TRACKER: Tracker<128, StdPlatform> = Tracker::new(
    StdPlatform::new(),
    TrackerConfig::DEFAULT
        .with_snapshot_floor(16 * 1024)
        .with_ceiling(64 * 1024),
);

#[global_allocator]
static GLOBAL: TracingAllocator<System, 128> = TracingAllocator::new(System, &TRACKER);

#[heaptrace::track]
fn grow(blocks: &mut Vec<Vec<u8>>) {
    blocks.push(vec![1u8; 4096]);
}

#[heaptrace::main(tracker = TRACKER)]
fn main() {
    let mut blocks = Vec::with_capacity(64);
    for _ in 0..64 {
        grow(&mut blocks);
    }
    println!("grew to {} blocks without hitting the ceiling", blocks.len());
}
