use thiserror::Error;

/// Errors returned while wrapping objects or building a [`Bvh`](crate::bvh::Bvh).
///
/// Internal invariant violations (a bug in the splitter, build or flattening) are not
/// represented here: they panic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BvhError {
    /// A BVH needs at least one object.
    #[error("no objects to build a BVH from")]
    NoObjects,

    #[error("object {index} has a non-finite bounding box")]
    NonFiniteBounds { index: usize },

    #[error("object {index} has an invalid intersection cost {cost}")]
    InvalidIntersectionCost { index: usize, cost: f64 },

    /// Object indices are stored as `u32`.
    #[error("too many objects: {count} (maximum {max})")]
    TooManyObjects { count: usize, max: usize },

    /// A build worker panicked. The other workers were stopped.
    #[error("BVH build worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Result type alias for BVH operations.
pub type Result<T> = std::result::Result<T, BvhError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            BvhError::NoObjects.to_string(),
            "no objects to build a BVH from"
        );
        let err = BvhError::InvalidIntersectionCost {
            index: 7,
            cost: -1.0,
        };
        assert!(err.to_string().contains('7'));
        assert!(err.to_string().contains("-1"));
    }
}
