//! Spinning rendezvous barriers
//!
//! Used to release a group of worker threads at the same instant (pipeline
//! start) or to step threads in lockstep. Waiters spin with
//! [`Backoff`] instead of parking, so release latency is a few hundred
//! nanoseconds rather than a scheduler wake-up.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::{Backoff, CachePadded};

/// One-shot barrier: the first `parties` calls to [`wait`](Self::wait) meet,
/// every later call returns immediately
#[derive(Debug)]
pub struct SpinBarrier {
    parties: usize,
    arrived: CachePadded<AtomicUsize>,
}

impl SpinBarrier {
    pub fn new(parties: usize) -> Self {
        Self {
            parties: parties.max(1),
            arrived: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Spin until all parties arrived; returns true for the last arrival
    pub fn wait(&self) -> bool {
        let position = self.arrived.fetch_add(1, Ordering::AcqRel) + 1;
        let backoff = Backoff::new();
        while self.arrived.load(Ordering::Acquire) < self.parties {
            backoff.snooze();
        }
        position == self.parties
    }

    pub fn is_released(&self) -> bool {
        self.arrived.load(Ordering::Acquire) >= self.parties
    }

    /// Let every current and future waiter through without the missing parties
    pub fn release(&self) {
        self.arrived.fetch_max(self.parties, Ordering::AcqRel);
    }
}

/// Reusable barrier: parties meet once per generation
#[derive(Debug)]
pub struct CyclicSpinBarrier {
    parties: usize,
    count: CachePadded<AtomicUsize>,
    generation: CachePadded<AtomicUsize>,
}

impl CyclicSpinBarrier {
    pub fn new(parties: usize) -> Self {
        Self {
            parties: parties.max(1),
            count: CachePadded::new(AtomicUsize::new(0)),
            generation: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Spin until all parties of the current generation arrived
    ///
    /// Returns true for exactly one thread per generation (the last one in).
    pub fn wait(&self) -> bool {
        let generation = self.generation.load(Ordering::Acquire);
        if self.count.fetch_add(1, Ordering::AcqRel) + 1 == self.parties {
            // reset before publishing the new generation
            self.count.store(0, Ordering::Relaxed);
            self.generation.fetch_add(1, Ordering::Release);
            return true;
        }

        let backoff = Backoff::new();
        while self.generation.load(Ordering::Acquire) == generation {
            backoff.snooze();
        }
        false
    }

    /// Completed generations
    pub fn generation(&self) -> usize {
        self.generation.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_spin_barrier_single_leader() {
        let barrier = Arc::new(SpinBarrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || barrier.wait())
            })
            .collect();

        let leaders = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&leader| leader)
            .count();
        assert_eq!(leaders, 1);
        assert!(barrier.is_released());
        // one-shot: late arrivals pass straight through
        assert!(!barrier.wait());
    }

    #[test]
    fn test_cyclic_barrier_lockstep() {
        const THREADS: usize = 3;
        const ROUNDS: usize = 50;

        let barrier = Arc::new(CyclicSpinBarrier::new(THREADS));
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for round in 0..ROUNDS {
                        counter.fetch_add(1, Ordering::SeqCst);
                        barrier.wait();
                        // every thread of this round has incremented
                        assert!(counter.load(Ordering::SeqCst) >= (round + 1) * THREADS);
                        barrier.wait();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(barrier.generation(), ROUNDS * 2);
        assert_eq!(counter.load(Ordering::SeqCst), ROUNDS * THREADS);
    }

    #[test]
    fn test_release_frees_waiters() {
        let barrier = Arc::new(SpinBarrier::new(3));
        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait())
        };
        barrier.release();
        assert!(!waiter.join().unwrap());
        assert!(barrier.is_released());
        assert!(!barrier.wait());
    }
}
