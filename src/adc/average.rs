/// Fixed-size circular sample buffer with an incremental running sum
///
/// `N` must be a power of two so the average is a shift of the sum. The buffer
/// starts uninitialized; the first sample (or an explicit [`fill`]) fills every
/// slot, after which each [`push`] replaces the oldest slot in O(1).
///
/// [`fill`]: RunningAverage::fill
/// [`push`]: RunningAverage::push
#[derive(Debug, Clone)]
pub struct RunningAverage<const N: usize> {
    buffer: [i32; N],
    sum: i32,
    index: usize,
    initialized: bool,
}

impl<const N: usize> RunningAverage<N> {
    const SHIFT: u32 = {
        assert!(N.is_power_of_two(), "running average size must be a power of two");
        N.trailing_zeros()
    };

    pub fn new() -> Self {
        let _ = Self::SHIFT;
        Self {
            buffer: [0; N],
            sum: 0,
            index: 0,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Overwrite every slot with `value` and mark the buffer initialized
    pub fn fill(&mut self, value: i32) {
        self.buffer = [value; N];
        self.sum = value * N as i32;
        self.index = 0;
        self.initialized = true;
    }

    /// Add a sample, bootstrapping the buffer with it on first use
    ///
    /// # Returns
    /// The value that was evicted from the oldest slot
    pub fn push(&mut self, value: i32) -> i32 {
        if !self.initialized {
            self.fill(value);
            return value;
        }

        let evicted = self.buffer[self.index];
        self.sum += value - evicted;
        self.buffer[self.index] = value;
        self.index = (self.index + 1) % N;
        evicted
    }

    /// The slot the next [`push`](RunningAverage::push) will replace
    pub fn oldest(&self) -> i32 {
        self.buffer[self.index]
    }

    /// Position of the next slot to be replaced
    pub fn cursor(&self) -> usize {
        self.index
    }

    pub fn sum(&self) -> i32 {
        self.sum
    }

    pub fn average(&self) -> i32 {
        self.sum >> Self::SHIFT
    }

    /// Forget every sample; the next push bootstraps again
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub const fn capacity() -> usize {
        N
    }
}

impl<const N: usize> Default for RunningAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}
