//! Debug-build assertion macros for the transport layer.
//!
//! Active only under `debug_assertions`; release builds pay nothing.

/// Occupancy never exceeds ring capacity.
macro_rules! debug_assert_occupancy {
    ($occupied:expr, $capacity:expr) => {
        debug_assert!(
            $occupied <= $capacity,
            "ring occupancy {} exceeds capacity {}",
            $occupied,
            $capacity
        )
    };
}

/// A sequence number only moves forward.
macro_rules! debug_assert_advances {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "{} sequence went backwards: {} -> {}",
            $name,
            $old,
            $new
        )
    };
}

/// The consumer never moves past the published producer position.
macro_rules! debug_assert_head_bounded {
    ($head:expr, $tail:expr) => {
        debug_assert!(
            $head <= $tail,
            "consumer sequence {} ahead of producer sequence {}",
            $head,
            $tail
        )
    };
}

pub(crate) use debug_assert_advances;
pub(crate) use debug_assert_head_bounded;
pub(crate) use debug_assert_occupancy;
