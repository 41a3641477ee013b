//! Visualization FIFO
//!
//! Single-producer/single-consumer lock-free ring of phase-space points,
//! carrying a decimated copy of the oscillator trajectory from the audio
//! thread to the UI. Neither side allocates or blocks after construction.
//!
//! When the ring is full the newest point is dropped. Points already queued
//! are never overwritten, so the UI always sees an unbroken prefix of the
//! trajectory.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use serde::{Deserialize, Serialize};

/// One raw oscillator position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    /// Point from its three coordinates
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<(f64, f64, f64)> for Point3 {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Self::new(x as f32, y as f32, z as f32)
    }
}

/// Create a connected producer/consumer pair holding up to `capacity` points
pub fn visualization_fifo(capacity: usize) -> (PointProducer, PointConsumer) {
    let capacity = capacity.max(1);
    let (producer, consumer) = HeapRb::<Point3>::new(capacity).split();
    (
        PointProducer {
            inner: producer,
            dropped: 0,
        },
        PointConsumer {
            inner: consumer,
            capacity,
        },
    )
}

/// Audio-thread end of the FIFO
pub struct PointProducer {
    inner: HeapProd<Point3>,
    dropped: u64,
}

impl PointProducer {
    /// Queue a point. Returns false (and drops it) if the ring is full.
    #[inline]
    pub fn push(&mut self, point: Point3) -> bool {
        match self.inner.try_push(point) {
            Ok(()) => true,
            Err(_) => {
                self.dropped += 1;
                false
            }
        }
    }

    /// Points discarded because the consumer fell behind
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// UI-thread end of the FIFO
pub struct PointConsumer {
    inner: HeapCons<Point3>,
    capacity: usize,
}

impl PointConsumer {
    /// Pop the oldest point, if any
    pub fn try_pop(&mut self) -> Option<Point3> {
        self.inner.try_pop()
    }

    /// Move every available point into `out`, returning how many were taken
    pub fn drain_into(&mut self, out: &mut Vec<Point3>) -> usize {
        let before = out.len();
        while let Some(point) = self.inner.try_pop() {
            out.push(point);
        }
        out.len() - before
    }

    /// Points waiting to be read
    pub fn len(&self) -> usize {
        self.inner.occupied_len()
    }

    /// True when no points are waiting
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Total number of points the FIFO can hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Picks which audio samples are forwarded to the FIFO
///
/// Emits `points_per_second` points on average, independent of block size.
#[derive(Debug, Clone)]
pub struct PointDecimator {
    samples_per_point: f64,
    counter: f64,
}

impl PointDecimator {
    /// Decimator emitting `points_per_second` ticks at `sample_rate`
    pub fn new(sample_rate: f64, points_per_second: f64) -> Self {
        let mut decimator = Self {
            samples_per_point: 1.0,
            counter: 0.0,
        };
        decimator.configure(sample_rate, points_per_second);
        decimator
    }

    /// Change the rates and restart the phase
    pub fn configure(&mut self, sample_rate: f64, points_per_second: f64) {
        self.samples_per_point = if points_per_second > 0.0 {
            (sample_rate / points_per_second).max(1.0)
        } else {
            f64::INFINITY
        };
        self.counter = 0.0;
    }

    /// Advance one sample; true when this sample should be published
    #[inline]
    pub fn tick(&mut self) -> bool {
        self.counter += 1.0;
        if self.counter >= self.samples_per_point {
            self.counter -= self.samples_per_point;
            true
        } else {
            false
        }
    }

    /// Restart the decimation phase
    pub fn reset(&mut self) {
        self.counter = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(i: usize) -> Point3 {
        Point3::new(i as f32, -(i as f32), 0.5 * i as f32)
    }

    #[test]
    fn test_fifo_overflow_drops_newest() {
        let (mut tx, mut rx) = visualization_fifo(8);
        for i in 0..20 {
            assert_eq!(tx.push(point(i)), i < 8);
        }
        assert_eq!(tx.dropped(), 12);
        assert_eq!(rx.len(), 8);

        for i in 0..8 {
            assert_eq!(rx.try_pop(), Some(point(i)));
        }
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn test_fifo_partial_reads() {
        let (mut tx, mut rx) = visualization_fifo(4);
        tx.push(point(0));
        tx.push(point(1));
        assert_eq!(rx.try_pop(), Some(point(0)));

        tx.push(point(2));
        let mut out = Vec::new();
        assert_eq!(rx.drain_into(&mut out), 2);
        assert_eq!(out, vec![point(1), point(2)]);
        assert!(rx.is_empty());
        assert_eq!(rx.capacity(), 4);
    }

    #[test]
    fn test_fifo_zero_capacity_still_works() {
        let (mut tx, mut rx) = visualization_fifo(0);
        assert!(tx.push(point(1)));
        assert!(!tx.push(point(2)));
        assert_eq!(rx.try_pop(), Some(point(1)));
    }

    #[test]
    fn test_fifo_across_threads_preserves_order() {
        let (mut tx, mut rx) = visualization_fifo(64);
        let total = 10_000;

        let producer = std::thread::spawn(move || {
            let mut i = 0;
            while i < total {
                if tx.push(point(i)) {
                    i += 1;
                } else {
                    std::thread::yield_now();
                }
            }
        });

        let mut received = Vec::with_capacity(total);
        while received.len() < total {
            if rx.drain_into(&mut received) == 0 {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();

        for (i, p) in received.iter().enumerate() {
            assert_eq!(*p, point(i));
        }
    }

    #[test]
    fn test_decimator_rate() {
        let mut decimator = PointDecimator::new(44100.0, 8000.0);
        let emitted = (0..44100).filter(|_| decimator.tick()).count();
        assert!((7999..=8000).contains(&emitted), "emitted = {}", emitted);
    }

    #[test]
    fn test_decimator_never_faster_than_audio() {
        let mut decimator = PointDecimator::new(1000.0, 5000.0);
        assert!((0..10).all(|_| decimator.tick()));

        let mut off = PointDecimator::new(1000.0, 0.0);
        assert!(!(0..1000).any(|_| off.tick()));
    }
}
