//! Streaming policy.

/// Default size (in bytes) at which the loader switches to streaming on its own.
pub const DEFAULT_MEMORY_THRESHOLD: u64 = 10_000_000;

/// Decide whether a reader should stream instead of loading the whole file.
///
/// Streams when `explicit` is set or when `file_size` has reached `threshold`.
pub fn should_stream(explicit: bool, file_size: u64, threshold: u64) -> bool {
    explicit || file_size >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_flag_always_streams() {
        assert!(should_stream(true, 0, DEFAULT_MEMORY_THRESHOLD));
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(!should_stream(false, 99, 100));
        assert!(should_stream(false, 100, 100));
        assert!(should_stream(false, 101, 100));
    }

    #[test]
    fn zero_threshold_streams_everything() {
        assert!(should_stream(false, 0, 0));
    }
}
