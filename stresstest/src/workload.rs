use std::io;
use std::num::NonZeroUsize;
use std::thread::available_parallelism;

use anyhow::Result;
use chunked_blob::BlobDescriptor;
use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::weighted::WeightedIndex;
use rand_distr::{Distribution, LogNormal, Zipf};

#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub concurrency: usize,
    pub seed: u64,

    pub p50_size: u64,
    pub p99_size: u64,

    pub write_weight: u8,
    pub range_write_weight: u8,
    pub read_weight: u8,
    pub delete_weight: u8,
}

pub struct WorkloadBuilder {
    name: &'static str,
    config: WorkloadConfig,
}

impl WorkloadBuilder {
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn size_distribution(mut self, p50: u64, p99: u64) -> Self {
        self.config.p50_size = p50;
        self.config.p99_size = p99;
        self
    }

    /// Relative weights of stream writes, range writes, reads and deletes.
    pub fn action_weights(mut self, writes: u8, range_writes: u8, reads: u8, deletes: u8) -> Self {
        self.config.write_weight = writes;
        self.config.range_write_weight = range_writes;
        self.config.read_weight = reads;
        self.config.delete_weight = deletes;
        self
    }

    pub fn build(self) -> Result<Workload> {
        let config = self.config;
        let rng = SmallRng::seed_from_u64(config.seed);

        // Inspired by <https://stats.stackexchange.com/a/649432>
        let p50 = config.p50_size as f64;
        let p99 = config.p99_size as f64;
        let mu = p50.ln();
        let sigma = (p99.ln() - mu) / 2.3263;

        let size_distribution = LogNormal::new(mu, sigma)?;
        let action_distribution = WeightedIndex::new([
            config.write_weight,
            config.range_write_weight,
            config.read_weight,
            config.delete_weight,
        ])?;

        Ok(Workload {
            name: self.name,
            config,

            rng,
            size_distribution,
            action_distribution,

            existing_blobs: Default::default(),
        })
    }
}

pub struct Workload {
    pub name: &'static str,
    pub config: WorkloadConfig,

    /// The RNG driving all our distributions.
    rng: SmallRng,
    /// Payload sizes of the write actions.
    size_distribution: LogNormal<f64>,
    /// Picks the next action.
    action_distribution: WeightedIndex<u8>,

    /// Blobs that were written and can be read or deleted.
    existing_blobs: Vec<(InternalId, BlobDescriptor)>,
}

impl Workload {
    pub fn builder(name: &'static str) -> WorkloadBuilder {
        WorkloadBuilder {
            name,
            config: WorkloadConfig {
                concurrency: available_parallelism().map_or(4, NonZeroUsize::get),
                seed: rand::random(),

                p50_size: 16 * 1024,
                p99_size: 1024 * 1024,

                write_weight: 25,
                range_write_weight: 25,
                read_weight: 25,
                delete_weight: 25,
            },
        }
    }

    fn get_payload(&self, seed: u64) -> Payload {
        let mut rng = SmallRng::seed_from_u64(seed);
        let len = self.size_distribution.sample(&mut rng) as u64;

        Payload { len, rng }
    }

    fn sample_existing(&mut self) -> Option<(InternalId, BlobDescriptor)> {
        if self.existing_blobs.is_empty() {
            return None;
        }
        let len = self.existing_blobs.len();
        let zipf = Zipf::new(len as f64, 2.0).ok()?;
        let idx = len - self.rng.sample(zipf) as usize;

        Some(self.existing_blobs.remove(idx))
    }

    pub fn next_action(&mut self) -> Action {
        loop {
            match self.action_distribution.sample(&mut self.rng) {
                kind @ (0 | 1) => {
                    let seed = self.rng.next_u64();
                    let payload = self.get_payload(seed);
                    let mode = if kind == 0 {
                        WriteMode::Stream
                    } else {
                        WriteMode::Ranges
                    };
                    return Action::Write(InternalId(seed), payload, mode);
                }
                2 => {
                    let Some((internal, descriptor)) = self.sample_existing() else {
                        continue;
                    };
                    let payload = self.get_payload(internal.0);
                    return Action::Read(internal, descriptor, payload);
                }
                _ => {
                    let Some((_internal, descriptor)) = self.sample_existing() else {
                        continue;
                    };
                    return Action::Delete(descriptor);
                }
            }
        }
    }

    /// Makes a blob available for reads or deletes.
    ///
    /// Has to be called once a write or read completed. Blobs that are being
    /// read are never deleted concurrently.
    pub fn push_blob(&mut self, internal: InternalId, descriptor: BlobDescriptor) {
        self.existing_blobs.push((internal, descriptor))
    }
}

#[derive(Debug, Eq, Hash, PartialEq)]
pub struct InternalId(u64);

#[derive(Debug, Clone, Copy)]
pub enum WriteMode {
    /// Append through a write stream.
    Stream,
    /// Chunk-aligned ranges, last one first.
    Ranges,
}

pub enum Action {
    Write(InternalId, Payload, WriteMode),
    Read(InternalId, BlobDescriptor, Payload),
    Delete(BlobDescriptor),
}

/// Deterministic pseudo-random contents of a blob.
pub struct Payload {
    pub len: u64,
    pub rng: SmallRng,
}

impl io::Read for Payload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len_to_fill = (buf.len() as u64).min(self.len) as usize;

        let fill_buf = &mut buf[..len_to_fill];
        self.rng.fill_bytes(fill_buf);

        self.len -= len_to_fill as u64;
        Ok(len_to_fill)
    }
}
