// Copyright 2025 N. Dornseif
//
// Dual-licensed under Apache 2.0 and MIT terms.

//! Deterministic fake source for tests and demos.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{bits_to_bytes, BitSource};
use crate::error::SourceError;

/// Produces pseudo-random bits from a seeded generator, `chunk_bits` bits
/// at a time, repacked into bytes for the caller. Unlike the real sources
/// it never fails.
pub struct FakeSource {
    rng: StdRng,
    chunk_bits: usize,
}

impl FakeSource {
    pub fn new(seed: u64, chunk_bits: usize) -> Self {
        FakeSource {
            rng: StdRng::seed_from_u64(seed),
            chunk_bits,
        }
    }

    fn generate_bits(&mut self) -> Vec<u8> {
        (0..self.chunk_bits)
            .map(|_| self.rng.random_range(0..=1u8))
            .collect()
    }
}

impl BitSource for FakeSource {
    fn read_chunk(&mut self) -> Result<Vec<u8>, SourceError> {
        Ok(bits_to_bytes(&self.generate_bits()))
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitsource::bytes_to_bits;

    #[test]
    fn same_seed_produces_same_stream() {
        let mut a = FakeSource::new(42, 64);
        let mut b = FakeSource::new(42, 64);
        assert_eq!(a.read_chunk().unwrap(), b.read_chunk().unwrap());
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = FakeSource::new(1, 256);
        let mut b = FakeSource::new(2, 256);
        assert_ne!(a.read_chunk().unwrap(), b.read_chunk().unwrap());
    }

    #[test]
    fn chunk_size_matches_configured_bits() {
        let mut source = FakeSource::new(7, 4096);
        let chunk = source.read_chunk().unwrap();
        assert_eq!(bytes_to_bits(&chunk).len(), 4096);
    }
}
