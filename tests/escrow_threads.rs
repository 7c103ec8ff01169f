// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! A producer and a consumer sharing one escrow, with textures drawn from a shared pool.

use present_pipeline::escrow::{Frame, FrameEscrow};
use present_pipeline::headless::{HeadlessAllocator, ManualFence};
use present_pipeline::texture::{TextureRecycler, UVec2};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

const FRAMES: u32 = 500;
const SIZE: UVec2 = UVec2::new(8, 8);

fn pool() -> (Arc<TextureRecycler>, HeadlessAllocator) {
    let allocator = HeadlessAllocator::new();
    (
        Arc::new(TextureRecycler::new(allocator.clone(), SIZE)),
        allocator,
    )
}

/// Fetches until `last` has been seen, returning every index fetched in order.
fn consume(escrow: &FrameEscrow, last: u32) -> Vec<u32> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut held = None;
    let mut seen = Vec::new();
    loop {
        if escrow.fetch_signaled(&mut held) {
            let index = held.as_ref().map(Frame::index).unwrap_or_default();
            seen.push(index);
            if index == last {
                break;
            }
        } else {
            assert!(Instant::now() < deadline, "stalled after {seen:?}");
            std::thread::yield_now();
        }
    }
    escrow.release_held(&mut held);
    seen
}

#[test]
fn consumer_sees_increasing_indices_and_nothing_leaks() {
    let (recycler, allocator) = pool();
    let escrow = Arc::new(FrameEscrow::new(recycler.clone()));

    let producer = {
        let escrow = escrow.clone();
        let recycler = recycler.clone();
        std::thread::spawn(move || {
            for index in 1..=FRAMES {
                let texture = recycler.get_next_texture();
                assert!(escrow.submit(Frame::new(texture, index, SIZE)));
                if index % 16 == 0 {
                    std::thread::sleep(Duration::from_micros(200));
                }
            }
        })
    };
    let seen = consume(&escrow, FRAMES);
    producer.join().unwrap();

    assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
    let stats = escrow.stats();
    assert_eq!(stats.submitted, FRAMES as u64);
    assert_eq!(stats.pending, None);
    assert_eq!(stats.superseded + seen.len() as u64, FRAMES as u64);

    let pool = recycler.stats();
    assert_eq!(pool.in_use, 0, "{pool:?}");
    //a handful of textures cycle; the pool does not grow with the frame count
    assert!(allocator.allocation_count() < 16, "{pool:?}");
    assert_eq!(allocator.double_free_count(), 0);
}

#[test]
fn unsignaled_frames_wait_for_the_gpu() {
    let (recycler, allocator) = pool();
    let escrow = Arc::new(FrameEscrow::new(recycler.clone()));
    let (gpu_queue, gpu_work) = mpsc::channel::<ManualFence>();

    let gpu = std::thread::spawn(move || {
        for fence in gpu_work {
            std::thread::sleep(Duration::from_micros(50));
            fence.signal();
        }
    });
    let producer = {
        let escrow = escrow.clone();
        let recycler = recycler.clone();
        std::thread::spawn(move || {
            for index in 1..=FRAMES {
                let fence = ManualFence::new();
                let texture = recycler.get_next_texture();
                assert!(escrow.submit(Frame::new(texture, index, SIZE).with_fence(fence.clone())));
                gpu_queue.send(fence).unwrap();
            }
        })
    };
    let seen = consume(&escrow, FRAMES);
    producer.join().unwrap();
    gpu.join().unwrap();

    assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
    assert_eq!(recycler.stats().in_use, 0);
    assert_eq!(allocator.double_free_count(), 0);
}

#[test]
fn blocking_fetch_waits_outside_the_lock() {
    let (recycler, _allocator) = pool();
    let escrow = Arc::new(FrameEscrow::new(recycler.clone()));
    let fence = ManualFence::new();
    escrow.submit(Frame::new(recycler.get_next_texture(), 1, SIZE).with_fence(fence.clone()));

    let consumer = {
        let escrow = escrow.clone();
        std::thread::spawn(move || {
            let mut held = None;
            assert!(escrow.fetch_blocking(&mut held));
            let index = held.as_ref().map(Frame::index);
            escrow.release_held(&mut held);
            index
        })
    };
    //the producer keeps submitting while the consumer waits on frame 1
    std::thread::sleep(Duration::from_millis(20));
    assert!(escrow.submit(Frame::new(recycler.get_next_texture(), 2, SIZE)));
    fence.signal();
    assert_eq!(consumer.join().unwrap(), Some(1));
    assert_eq!(escrow.stats().pending, Some(2));
    drop(escrow);
    assert_eq!(recycler.stats().in_use, 0);
}
