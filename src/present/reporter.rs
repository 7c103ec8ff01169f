// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Presentation statistics.

use await_values::{Observer, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

const RATE_SAMPLES: usize = 60;

/**
Events per second over the most recent samples.

Each call to [RateCounter::increment] records one event; the rate is the number of
intervals in the window divided by the time they span.
*/
#[derive(Debug, Clone, Default)]
pub struct RateCounter {
    samples: VecDeque<Instant>,
}

impl RateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self) {
        self.increment_at(Instant::now());
    }

    pub fn increment_by(&mut self, count: u32) {
        let now = Instant::now();
        for _ in 0..count {
            self.increment_at(now);
        }
    }

    pub fn increment_at(&mut self, at: Instant) {
        self.samples.push_back(at);
        while self.samples.len() > RATE_SAMPLES {
            self.samples.pop_front();
        }
    }

    pub fn rate(&self) -> f32 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        let span = last.duration_since(*first);
        if span == Duration::ZERO {
            return 0.0;
        }
        (self.samples.len() - 1) as f32 / span.as_secs_f32()
    }
}

#[derive(Debug)]
struct Rates {
    present: RateCounter,
    new_frame: RateCounter,
    dropped_frame: RateCounter,
    last_index: Option<u32>,
}

#[derive(Debug)]
pub(crate) struct ReporterImpl {
    presents: AtomicU64,
    dropped: AtomicU64,
    //u64::MAX until something is presented
    last_presented: AtomicU64,
    rates: Mutex<Rates>,
    present_rate: Value<i32>,
    new_frame_rate: Value<i32>,
    dropped_frame_rate: Value<i32>,
}

impl ReporterImpl {
    fn rates(&self) -> std::sync::MutexGuard<'_, Rates> {
        self.rates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A frame with `index` was fetched for display.  Gaps in the index count as drops.
    pub(crate) fn record_new_frame(&self, index: u32) {
        let mut rates = self.rates();
        if let Some(previous) = rates.last_index
            && index > previous
        {
            let skipped = index - previous - 1;
            if skipped > 0 {
                rates.dropped_frame.increment_by(skipped);
                self.dropped.fetch_add(skipped as u64, Ordering::Relaxed);
            }
        }
        rates.last_index = Some(index);
        rates.new_frame.increment();
        self.new_frame_rate.set(rates.new_frame.rate().round() as i32);
        self.dropped_frame_rate
            .set(rates.dropped_frame.rate().round() as i32);
    }

    pub(crate) fn record_present(&self, index: u32) {
        self.presents.fetch_add(1, Ordering::Relaxed);
        self.last_presented.store(index as u64, Ordering::Relaxed);
        let mut rates = self.rates();
        rates.present.increment();
        self.present_rate.set(rates.present.rate().round() as i32);
    }
}

/**
Lets clients watch presentation activity.

Cheap to clone; every clone observes the same display.
*/
#[derive(Clone, Debug)]
pub struct PresentReporter {
    imp: Arc<ReporterImpl>,
    present_rate: Observer<i32>,
    new_frame_rate: Observer<i32>,
    dropped_frame_rate: Observer<i32>,
}

impl PresentReporter {
    pub(crate) fn new() -> Self {
        let present_rate = Value::new(0);
        let new_frame_rate = Value::new(0);
        let dropped_frame_rate = Value::new(0);
        let present_rate_observer = present_rate.observe();
        let new_frame_rate_observer = new_frame_rate.observe();
        let dropped_frame_rate_observer = dropped_frame_rate.observe();
        PresentReporter {
            imp: Arc::new(ReporterImpl {
                presents: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                last_presented: AtomicU64::new(u64::MAX),
                rates: Mutex::new(Rates {
                    present: RateCounter::new(),
                    new_frame: RateCounter::new(),
                    dropped_frame: RateCounter::new(),
                    last_index: None,
                }),
                present_rate,
                new_frame_rate,
                dropped_frame_rate,
            }),
            present_rate: present_rate_observer,
            new_frame_rate: new_frame_rate_observer,
            dropped_frame_rate: dropped_frame_rate_observer,
        }
    }

    pub(crate) fn sender(&self) -> &ReporterImpl {
        &self.imp
    }

    pub fn present_count(&self) -> u64 {
        self.imp.presents.load(Ordering::Relaxed)
    }

    /// Frames whose index was skipped between two fetched frames.
    pub fn dropped_frame_count(&self) -> u64 {
        self.imp.dropped.load(Ordering::Relaxed)
    }

    pub fn last_presented_index(&self) -> Option<u32> {
        let v = self.imp.last_presented.load(Ordering::Relaxed);
        u32::try_from(v).ok()
    }

    pub fn present_rate(&self) -> f32 {
        self.imp.rates().present.rate()
    }

    pub fn new_frame_rate(&self) -> f32 {
        self.imp.rates().new_frame.rate()
    }

    pub fn dropped_frame_rate(&self) -> f32 {
        self.imp.rates().dropped_frame.rate()
    }

    /// Presents per second, rounded.
    pub fn present_rate_observer(&self) -> &Observer<i32> {
        &self.present_rate
    }

    pub fn new_frame_rate_observer(&self) -> &Observer<i32> {
        &self.new_frame_rate
    }

    pub fn dropped_frame_rate_observer(&self) -> &Observer<i32> {
        &self.dropped_frame_rate
    }
}
