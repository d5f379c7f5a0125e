use std::collections::VecDeque;
use std::num::NonZeroUsize;
use crate::types::Reading;
/// Rolling buffer of the most recent readings, oldest first.
#[derive(Clone, Debug)]
pub struct HistoryWindow {
    readings: VecDeque<Reading>,
    capacity: usize,
}
impl HistoryWindow {
    pub fn new(capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get();
        Self {
            // Large windows grow on demand instead of reserving up front.
            readings: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn len(&self) -> usize {
        self.readings.len()
    }
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
    pub fn push(&mut self, reading: Reading) {
        self.readings.push_back(reading);
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
        }
    }
    /// Borrowed view over the buffered readings, oldest first. The window
    /// cannot be pushed to while the iterator is alive.
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &Reading> + ExactSizeIterator + Clone {
        self.readings.iter()
    }
    /// Owned copy for consumers that outlive the current tick.
    pub fn snapshot(&self) -> Vec<Reading> {
        self.readings.iter().cloned().collect()
    }
    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }
    /// Values of one channel, oldest first.
    pub fn channel(&self, index: usize) -> impl Iterator<Item = f64> + '_ {
        self.readings
            .iter()
            .filter_map(move |r| r.channels().get(index).copied())
    }
}
impl Extend<Reading> for HistoryWindow {
    fn extend<T: IntoIterator<Item = Reading>>(&mut self, iter: T) {
        for reading in iter {
            self.push(reading);
        }
    }
}
