// Copyright 2025 N. Dornseif
//
// Dual-licensed under Apache 2.0 and MIT terms.

//! Entropy sources: a hardware device reader, a kernel-entropy fallback,
//! and a deterministic fake for tests and demos.

mod device;
mod fake;

pub use device::DeviceSource;
pub use fake::FakeSource;

use crate::error::SourceError;

/// A source of raw entropy bytes. `close` must be idempotent.
pub trait BitSource {
    fn read_chunk(&mut self) -> Result<Vec<u8>, SourceError>;
    fn close(&mut self);
}

/// Expands bytes to bits **LSB-first**: bit 0 of the output is bit 0 of the
/// first byte, bit 7 is bit 7 of the first byte, bit 8 is bit 0 of the
/// second byte, and so on.
pub fn bytes_to_bits(data: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(data.len() * 8);
    for byte in data {
        for shift in 0..8 {
            bits.push((byte >> shift) & 1);
        }
    }
    bits
}

/// Repacks LSB-first bits into bytes, padding the final byte with zeros.
/// Inverse of [`bytes_to_bits`] on aligned inputs.
pub fn bits_to_bytes(bits: &[u8]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (shift, &bit)| acc | ((bit & 1) << shift))
        })
        .collect()
}

/// Flips bit `i` of `bits` in place iff `i mod floor(1/bias) == 0`, for
/// `bias` in `(0, 0.5]`. `bias <= 0` is a no-op.
pub fn apply_bias(bits: &mut [u8], bias: f64) {
    if bias <= 0.0 {
        return;
    }
    let step = (1.0 / bias).floor() as usize;
    if step == 0 {
        return;
    }
    for (i, bit) in bits.iter_mut().enumerate() {
        if i % step == 0 {
            *bit ^= 1;
        }
    }
}
