// Copyright 2025 N. Dornseif
//
// Dual-licensed under Apache 2.0 and MIT terms.

//! Synchronised fixed-size ring buffers over multiple window sizes.

use std::collections::{BTreeMap, VecDeque};

/// One fixed-capacity ring buffer of bits for a single window size.
struct WindowBuffer {
    capacity: usize,
    bits: VecDeque<u8>,
}

impl WindowBuffer {
    fn new(capacity: usize) -> Self {
        WindowBuffer {
            capacity,
            bits: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, bit: u8) {
        if self.bits.len() == self.capacity {
            self.bits.pop_front();
        }
        self.bits.push_back(bit);
    }

    fn is_full(&self) -> bool {
        self.bits.len() == self.capacity
    }

    fn clear(&mut self) {
        self.bits.clear();
    }
}

/// Maintains one [`WindowBuffer`] per configured window size, all fed the
/// same trailing suffix of the bit stream.
pub struct RollingWindows {
    buffers: BTreeMap<usize, WindowBuffer>,
}

impl RollingWindows {
    /// `sizes` must be non-empty; non-positive sizes have no meaning and
    /// are the caller's responsibility to filter out before construction.
    pub fn new(sizes: impl IntoIterator<Item = usize>) -> Self {
        let buffers = sizes
            .into_iter()
            .filter(|&s| s > 0)
            .map(|s| (s, WindowBuffer::new(s)))
            .collect();
        RollingWindows { buffers }
    }

    /// Appends every bit to every configured buffer.
    pub fn add_bits(&mut self, bits: &[u8]) {
        for &bit in bits {
            for buffer in self.buffers.values_mut() {
                buffer.push(bit);
            }
        }
    }

    /// Current contents of each buffer, in stream order, keyed by window
    /// size. Length may be less than the window size during warm-up.
    pub fn as_arrays(&self) -> BTreeMap<usize, Vec<u8>> {
        self.buffers
            .iter()
            .map(|(&size, buffer)| (size, buffer.bits.iter().copied().collect()))
            .collect()
    }

    /// True iff the buffer for `min_size` (or the smallest configured
    /// window, if `None`) is full.
    pub fn has_enough_data(&self, min_size: Option<usize>) -> bool {
        let key = match min_size {
            Some(size) => size,
            None => match self.buffers.keys().next() {
                Some(&smallest) => smallest,
                None => return false,
            },
        };
        self.buffers.get(&key).is_some_and(WindowBuffer::is_full)
    }

    pub fn clear(&mut self) {
        for buffer in self.buffers.values_mut() {
            buffer.clear();
        }
    }

    pub fn window_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.buffers.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_keeps_most_recent_tail() {
        let mut windows = RollingWindows::new([4]);
        for bit in [1, 0, 1, 1, 0, 0, 1] {
            windows.add_bits(&[bit]);
        }
        assert_eq!(windows.as_arrays()[&4], vec![1, 0, 0, 1]);
    }

    #[test]
    fn buffers_share_the_same_trailing_suffix() {
        let mut windows = RollingWindows::new([2, 5]);
        for bit in [1, 1, 0, 0, 1, 0] {
            windows.add_bits(&[bit]);
        }
        let arrays = windows.as_arrays();
        assert_eq!(arrays[&2], vec![1, 0]);
        assert_eq!(arrays[&5], vec![1, 0, 0, 1, 0]);
    }

    #[test]
    fn has_enough_data_checks_smallest_by_default() {
        let mut windows = RollingWindows::new([3, 10]);
        windows.add_bits(&[1, 0, 1]);
        assert!(windows.has_enough_data(None));
        assert!(!windows.has_enough_data(Some(10)));
    }

    #[test]
    fn clear_empties_every_buffer() {
        let mut windows = RollingWindows::new([2]);
        windows.add_bits(&[1, 1]);
        windows.clear();
        assert_eq!(windows.as_arrays()[&2], Vec::<u8>::new());
        assert!(!windows.has_enough_data(None));
    }
}
