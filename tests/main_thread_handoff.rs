// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Borrowing the graphics context from the presentation thread.

use present_pipeline::config::PresentConfig;
use present_pipeline::headless::{HeadlessAllocator, HeadlessContext, HeadlessDevice};
use present_pipeline::present::{Display, PresentPhase, PresentThread};
use present_pipeline::texture::{TextureHandle, TextureRecycler, UVec2};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);
const SIZE: UVec2 = UVec2::new(16, 16);

fn config() -> PresentConfig {
    PresentConfig {
        shutdown_timeout: WAIT,
        ..Default::default()
    }
}

#[test]
fn concurrent_borrowers_while_presenting() {
    let context = HeadlessContext::new();
    let thread = PresentThread::spawn(context.clone(), config()).unwrap();
    let device = HeadlessDevice::new("main", SIZE);
    let probe = device.clone();
    let recycler = Arc::new(TextureRecycler::new(HeadlessAllocator::new(), SIZE));
    let display = Arc::new(Display::threaded(device, recycler.clone(), &thread));
    display.activate_blocking().unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let producer = {
        let display = display.clone();
        let recycler = recycler.clone();
        let stop = stop.clone();
        std::thread::spawn(move || {
            let mut index = 0;
            while !stop.load(Ordering::Relaxed) {
                index += 1;
                display.submit_scene_texture(index, recycler.get_next_texture(), SIZE);
                std::thread::sleep(Duration::from_micros(500));
            }
        })
    };

    let borrowers: Vec<_> = (0..4)
        .map(|_| {
            let display = display.clone();
            let context = context.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    let seen = display
                        .with_main_thread_context(|_| {
                            (context.is_current_here(), std::thread::current().id())
                        })
                        .unwrap();
                    assert_eq!(seen, (true, std::thread::current().id()));
                    assert!(!context.is_current_here());
                }
            })
        })
        .collect();
    for borrower in borrowers {
        borrower.join().unwrap();
    }
    //presentation continues after the handoffs
    let presented = probe.presented_indices().len();
    assert!(probe.wait_for_presents(presented + 1, WAIT));

    stop.store(true, Ordering::Relaxed);
    producer.join().unwrap();
    display.deactivate_blocking().unwrap();
    thread.shutdown().unwrap();

    assert_eq!(context.violation_count(), 0);
    let shown = probe.presented_indices();
    assert!(shown.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(recycler.stats().in_use, 0);
}

#[test]
fn borrowing_after_shutdown_uses_the_parked_context() {
    let context = HeadlessContext::new();
    let thread = PresentThread::spawn(context.clone(), config()).unwrap();
    thread.shutdown().unwrap();

    let borrowers: Vec<_> = (0..3)
        .map(|_| {
            let thread = thread.clone();
            let context = context.clone();
            std::thread::spawn(move || {
                thread
                    .with_main_thread_context(|ctx| {
                        assert!(context.is_current_here());
                        ctx.swap_buffers()
                    })
                    .unwrap()
                    .unwrap();
            })
        })
        .collect();
    for borrower in borrowers {
        borrower.join().unwrap();
    }
    assert_eq!(context.swap_count(), 3);
    assert_eq!(context.violation_count(), 0);
    assert!(!context.is_current_anywhere());

    //once taken back, there is nothing left to lend
    assert!(thread.take_context().is_some());
    assert!(thread.with_main_thread_context(|_| ()).is_err());
}

#[test]
fn inline_displays_lend_their_own_context() {
    let context = HeadlessContext::new();
    let display = Display::inline(
        HeadlessDevice::new("inline", SIZE),
        Arc::new(|_: TextureHandle| {}),
        context.clone(),
    );
    let current = display
        .with_main_thread_context(|_| context.is_current_here())
        .unwrap();
    assert!(current);
    assert!(!context.is_current_anywhere());
}

#[test]
fn borrowing_while_idle() {
    let context = HeadlessContext::new();
    let thread = PresentThread::spawn(context.clone(), config()).unwrap();
    for _ in 0..10 {
        assert_eq!(thread.with_main_thread_context(|_| 7).unwrap(), 7);
    }
    assert!(thread.is_running());
    assert_eq!(context.make_current_count(), 10);
    thread.shutdown().unwrap();
}

#[test]
fn presenting_resumes_before_the_borrow_returns() {
    let context = HeadlessContext::new();
    let thread = PresentThread::spawn(context.clone(), config()).unwrap();
    let recycler = Arc::new(TextureRecycler::new(HeadlessAllocator::new(), SIZE));
    let display = Display::threaded(HeadlessDevice::new("main", SIZE), recycler, &thread);
    display.activate_blocking().unwrap();
    for _ in 0..50 {
        display.with_main_thread_context(|_| ()).unwrap();
        assert_eq!(thread.phase(), PresentPhase::Active);
    }
    display.deactivate_blocking().unwrap();
    thread.shutdown().unwrap();
    assert_eq!(context.violation_count(), 0);
}
