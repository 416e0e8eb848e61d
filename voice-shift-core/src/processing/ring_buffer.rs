use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Lock-free single-producer/single-consumer ring of f32 samples.
///
/// Carries audio between the capture callback, the render callback and the
/// recording writer. Neither side ever blocks or allocates on `write` /
/// `read_into`, so both ends are safe to use on a real-time thread.
///
/// Samples are stored as `AtomicU32` bit patterns; the read/write counters
/// grow monotonically (wrapping) and publish data with release/acquire.
///
/// Overflow behavior: the producer writes what fits and reports how many
/// samples it accepted; the rest is dropped by the caller.
#[derive(Debug)]
pub struct RingBuffer {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    slots: Box<[AtomicU32]>,
    capacity: usize,
    /// Total samples consumed.
    read_counter: AtomicUsize,
    /// Total samples produced.
    write_counter: AtomicUsize,
}

impl Shared {
    fn count(&self) -> usize {
        let written = self.write_counter.load(Ordering::Acquire);
        let read = self.read_counter.load(Ordering::Acquire);
        written.wrapping_sub(read)
    }
}

impl RingBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots = (0..capacity).map(|_| AtomicU32::new(0)).collect::<Vec<_>>().into_boxed_slice();
        Self {
            shared: Arc::new(Shared {
                slots,
                capacity,
                read_counter: AtomicUsize::new(0),
                write_counter: AtomicUsize::new(0),
            }),
        }
    }

    /// Split into the two endpoints. Each may move to its own thread.
    pub fn split(self) -> (RingProducer, RingConsumer) {
        (
            RingProducer {
                shared: Arc::clone(&self.shared),
            },
            RingConsumer { shared: self.shared },
        )
    }
}

/// Writing end of a [`RingBuffer`].
#[derive(Debug)]
pub struct RingProducer {
    shared: Arc<Shared>,
}

impl RingProducer {
    /// Append as many samples as fit. Returns the number accepted.
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let shared = &*self.shared;
        let written = shared.write_counter.load(Ordering::Relaxed);
        let read = shared.read_counter.load(Ordering::Acquire);
        let free = shared.capacity - written.wrapping_sub(read);
        let to_write = samples.len().min(free);

        for (i, &sample) in samples[..to_write].iter().enumerate() {
            let index = written.wrapping_add(i) % shared.capacity;
            shared.slots[index].store(sample.to_bits(), Ordering::Relaxed);
        }
        shared
            .write_counter
            .store(written.wrapping_add(to_write), Ordering::Release);
        to_write
    }

    /// Free space in samples.
    pub fn free_len(&self) -> usize {
        self.shared.capacity - self.shared.count()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

/// Reading end of a [`RingBuffer`].
#[derive(Debug)]
pub struct RingConsumer {
    shared: Arc<Shared>,
}

impl RingConsumer {
    /// Fill `out` with up to `out.len()` samples. Returns the number read.
    pub fn read_into(&mut self, out: &mut [f32]) -> usize {
        let shared = &*self.shared;
        let read = shared.read_counter.load(Ordering::Relaxed);
        let written = shared.write_counter.load(Ordering::Acquire);
        let available = written.wrapping_sub(read);
        let to_read = out.len().min(available);

        for (i, slot) in out[..to_read].iter_mut().enumerate() {
            let index = read.wrapping_add(i) % shared.capacity;
            *slot = f32::from_bits(shared.slots[index].load(Ordering::Relaxed));
        }
        shared
            .read_counter
            .store(read.wrapping_add(to_read), Ordering::Release);
        to_read
    }

    /// Read and remove up to `count` samples (allocates; not for the real-time thread).
    pub fn read(&mut self, count: usize) -> Vec<f32> {
        let mut out = vec![0.0; count.min(self.count())];
        let n = self.read_into(&mut out);
        out.truncate(n);
        out
    }

    /// Number of samples currently available for reading.
    pub fn count(&self) -> usize {
        self.shared.count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Discard everything currently readable.
    pub fn clear(&mut self) {
        let written = self.shared.write_counter.load(Ordering::Acquire);
        self.shared.read_counter.store(written, Ordering::Release);
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn basic_write_read() {
        let (mut tx, mut rx) = RingBuffer::with_capacity(10).split();
        assert_eq!(tx.write(&[1.0, 2.0, 3.0]), 3);

        assert_eq!(rx.count(), 3);
        assert_eq!(rx.read(3), vec![1.0, 2.0, 3.0]);
        assert!(rx.is_empty());
    }

    #[test]
    fn read_partial() {
        let (mut tx, mut rx) = RingBuffer::with_capacity(10).split();
        tx.write(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        let mut first = [0.0; 3];
        assert_eq!(rx.read_into(&mut first), 3);
        assert_eq!(first, [1.0, 2.0, 3.0]);
        assert_eq!(rx.count(), 2);

        let rest = rx.read(10); // request more than available
        assert_eq!(rest, vec![4.0, 5.0]);
        assert!(rx.is_empty());
    }

    #[test]
    fn overflow_accepts_only_what_fits() {
        let (mut tx, mut rx) = RingBuffer::with_capacity(4).split();
        assert_eq!(tx.write(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(tx.write(&[4.0, 5.0, 6.0]), 1);
        assert_eq!(tx.free_len(), 0);

        assert_eq!(rx.read(4), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn wraparound() {
        let (mut tx, mut rx) = RingBuffer::with_capacity(4).split();

        tx.write(&[1.0, 2.0, 3.0]);
        rx.read(2); // discard 1.0, 2.0

        assert_eq!(tx.write(&[4.0, 5.0, 6.0]), 3); // wraps around

        assert_eq!(rx.count(), 4);
        assert_eq!(rx.read(4), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn clear_discards_pending() {
        let (mut tx, mut rx) = RingBuffer::with_capacity(10).split();
        tx.write(&[1.0, 2.0, 3.0]);
        rx.clear();

        assert!(rx.is_empty());
        assert_eq!(tx.free_len(), 10);
        tx.write(&[7.0]);
        assert_eq!(rx.read(10), vec![7.0]);
    }

    #[test]
    fn empty_operations() {
        let (mut tx, mut rx) = RingBuffer::with_capacity(10).split();

        assert!(rx.is_empty());
        assert!(rx.read(5).is_empty());
        let mut out = [0.0; 4];
        assert_eq!(rx.read_into(&mut out), 0);

        assert_eq!(tx.write(&[]), 0);
        assert!(rx.is_empty());
    }

    #[test]
    fn transfers_in_order_across_threads() {
        let (mut tx, mut rx) = RingBuffer::with_capacity(64).split();
        const TOTAL: usize = 10_000;

        let producer = thread::spawn(move || {
            let mut next = 0usize;
            while next < TOTAL {
                let end = (next + 16).min(TOTAL);
                let chunk: Vec<f32> = (next..end).map(|v| v as f32).collect();
                next += tx.write(&chunk);
                thread::yield_now();
            }
        });

        let mut received = Vec::with_capacity(TOTAL);
        let mut buf = [0.0f32; 32];
        while received.len() < TOTAL {
            let n = rx.read_into(&mut buf);
            received.extend_from_slice(&buf[..n]);
            if n == 0 {
                thread::yield_now();
            }
        }
        producer.join().unwrap();

        assert!(received.iter().enumerate().all(|(i, &v)| v == i as f32));
    }
}
