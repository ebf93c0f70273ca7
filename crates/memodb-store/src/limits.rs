//! Size limits enforced by the store.

/// Default maximum length of a single path segment, in bytes.
pub const DEFAULT_MAX_SEGMENT_LEN: usize = 255;

/// Default maximum key length, in bytes.
pub const DEFAULT_MAX_KEY_LEN: usize = 127;

/// Default maximum value length, in bytes.
pub const DEFAULT_MAX_VALUE_LEN: usize = 1024;

/// Length limits applied to every segment, key and value.
///
/// Oversized input is rejected with an error, never truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Maximum length of one path segment.
    pub max_segment_len: usize,
    /// Maximum key length.
    pub max_key_len: usize,
    /// Maximum value length.
    pub max_value_len: usize,
}

impl StoreLimits {
    /// Sets the maximum segment length.
    pub fn with_max_segment_len(mut self, len: usize) -> Self {
        self.max_segment_len = len;
        self
    }

    /// Sets the maximum key length.
    pub fn with_max_key_len(mut self, len: usize) -> Self {
        self.max_key_len = len;
        self
    }

    /// Sets the maximum value length.
    pub fn with_max_value_len(mut self, len: usize) -> Self {
        self.max_value_len = len;
        self
    }
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_segment_len: DEFAULT_MAX_SEGMENT_LEN,
            max_key_len: DEFAULT_MAX_KEY_LEN,
            max_value_len: DEFAULT_MAX_VALUE_LEN,
        }
    }
}
