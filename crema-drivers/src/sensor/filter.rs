//! Moving average over the last N readings

use heapless::HistoryBuffer;

pub struct MovingAverage<const N: usize> {
    history: HistoryBuffer<i32, N>,
}

impl<const N: usize> MovingAverage<N> {
    pub const fn new() -> Self {
        Self {
            history: HistoryBuffer::new(),
        }
    }

    /// Add a reading and return the mean of what the window holds
    pub fn push(&mut self, value: i32) -> i32 {
        self.history.write(value);
        let sum: i32 = self.history.iter().sum();
        sum / self.history.len() as i32
    }

    /// Forget history, e.g. after the sensor dropped out
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

impl<const N: usize> Default for MovingAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_slides() {
        let mut avg = MovingAverage::<4>::new();
        assert_eq!(avg.push(100), 100);
        assert_eq!(avg.push(200), 150);
        avg.push(300);
        avg.push(400);
        assert_eq!(avg.push(500), 350);
    }

    #[test]
    fn test_reset() {
        let mut avg = MovingAverage::<4>::new();
        avg.push(1000);
        avg.reset();
        assert_eq!(avg.push(10), 10);
    }
}
