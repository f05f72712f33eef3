use crate::error::ChunkError;

/// Chunk size policy: minimum, target (average), and maximum chunk sizes in
/// bytes.
///
/// The target is the statistical average the boundary detector aims for;
/// actual chunk sizes vary with content between `min` and `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPolicy {
    min: u32,
    target: u32,
    max: u32,
}

impl ChunkPolicy {
    /// Bounds imposed by the FastCDC gear-hash construction.
    const MIN_FLOOR: u32 = 64;
    const TARGET_FLOOR: u32 = 256;
    const MAX_FLOOR: u32 = 1024;
    const MAX_CEILING: u32 = 1 << 30;

    /// Create a policy, validating `min <= target <= max` and the absolute
    /// bounds of the boundary detector.
    pub fn new(min: u32, target: u32, max: u32) -> Result<Self, ChunkError> {
        if min < Self::MIN_FLOOR {
            return Err(ChunkError::InvalidPolicy(format!(
                "min {min} below floor {}",
                Self::MIN_FLOOR
            )));
        }
        if target < Self::TARGET_FLOOR {
            return Err(ChunkError::InvalidPolicy(format!(
                "target {target} below floor {}",
                Self::TARGET_FLOOR
            )));
        }
        if max < Self::MAX_FLOOR {
            return Err(ChunkError::InvalidPolicy(format!(
                "max {max} below floor {}",
                Self::MAX_FLOOR
            )));
        }
        if max > Self::MAX_CEILING {
            return Err(ChunkError::InvalidPolicy(format!(
                "max {max} above ceiling {}",
                Self::MAX_CEILING
            )));
        }
        if !(min <= target && target <= max) {
            return Err(ChunkError::InvalidPolicy(format!(
                "sizes out of order: min {min}, target {target}, max {max}"
            )));
        }
        Ok(Self { min, target, max })
    }

    /// Policy with the given target size, min a quarter of it and max four
    /// times it (the customary FastCDC spread).
    pub fn with_target(target: u32) -> Result<Self, ChunkError> {
        Self::new(
            (target / 4).max(Self::MIN_FLOOR),
            target,
            (target.saturating_mul(4)).min(Self::MAX_CEILING),
        )
    }

    /// Minimum chunk size in bytes.
    pub fn min(&self) -> u32 {
        self.min
    }

    /// Target (average) chunk size in bytes.
    pub fn target(&self) -> u32 {
        self.target
    }

    /// Maximum chunk size in bytes.
    pub fn max(&self) -> u32 {
        self.max
    }
}

impl Default for ChunkPolicy {
    /// min 64 KiB, target 256 KiB, max 1 MiB.
    fn default() -> Self {
        Self {
            min: 64 * 1024,
            target: 256 * 1024,
            max: 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let p = ChunkPolicy::default();
        assert_eq!(
            ChunkPolicy::new(p.min(), p.target(), p.max()).unwrap(),
            p
        );
    }

    #[test]
    fn with_target_spreads_quarter_to_four_times() {
        let p = ChunkPolicy::with_target(256 * 1024).unwrap();
        assert_eq!(p.min(), 64 * 1024);
        assert_eq!(p.max(), 1024 * 1024);
    }

    #[test]
    fn rejects_out_of_order_sizes() {
        assert!(matches!(
            ChunkPolicy::new(4096, 2048, 8192),
            Err(ChunkError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn rejects_tiny_min() {
        assert!(ChunkPolicy::new(16, 256, 1024).is_err());
    }

    #[test]
    fn rejects_huge_max() {
        assert!(ChunkPolicy::new(64, 256, u32::MAX).is_err());
    }
}
