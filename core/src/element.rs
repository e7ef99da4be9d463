use num_traits::{FromPrimitive, Num, NumAssign, ToPrimitive};
use std::fmt::Debug;

/// Trait bound for values that can travel through a collective.
///
/// # Requirements
/// - `Copy`: buffers are flat `Vec<T>` and elements are moved around by value.
/// - `Num + NumAssign`: reductions add elements in place.
/// - `FromPrimitive + ToPrimitive`: means divide by the world size and ratios
///   are read back as `f64`.
/// - `Send + Sync + 'static`: every rank runs on its own thread.
pub trait Element:
    Num
    + NumAssign
    + Copy
    + Clone
    + Debug
    + Send
    + Sync
    + FromPrimitive
    + ToPrimitive
    + 'static
{
}

impl<T> Element for T where
    T: Num
        + NumAssign
        + Copy
        + Clone
        + Debug
        + Send
        + Sync
        + FromPrimitive
        + ToPrimitive
        + 'static
{
}
