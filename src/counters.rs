use std::sync::atomic::{AtomicU64, Ordering};

/// Diagnostic counts of chunk loads and stores.
///
/// Shared behind an `Arc` between a provider and every cursor it opens. They
/// have no influence on behavior.
#[derive(Debug, Default)]
pub struct ChunkCounters {
    reads: AtomicU64,
    writes: AtomicU64,
}

impl ChunkCounters {
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn counts_from_many_threads() {
        let counters = Arc::new(ChunkCounters::default());
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let counters = Arc::clone(&counters);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        counters.record_read();
                        counters.record_write();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(counters.reads(), 400);
        assert_eq!(counters.writes(), 400);

        counters.reset();
        assert_eq!(counters.reads(), 0);
        assert_eq!(counters.writes(), 0);
    }
}
