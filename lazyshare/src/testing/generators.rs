//! Property test generators.
//!
//! Each generator respects the validation rules of the type it produces.

use proptest::prelude::*;

use crate::config::ResourceName;
use crate::testing::scripted::OpenStep;

/// Generates valid `ResourceName` values.
pub fn arb_resource_name() -> impl Strategy<Value = ResourceName> {
    "[a-z][a-z0-9-]{0,40}".prop_filter_map("Invalid ResourceName", |s| ResourceName::try_new(s).ok())
}

/// Generates an order in which to close between 1 and `max_handles` handles.
///
/// The value is a permutation of `0..n`.
///
/// # Example
/// ```rust,ignore
/// proptest! {
///     #[test]
///     fn closes_once(order in arb_close_order(16)) {
///         let mut sorted = order.clone();
///         sorted.sort_unstable();
///         prop_assert_eq!(sorted, (0..order.len()).collect::<Vec<_>>());
///     }
/// }
/// ```
pub fn arb_close_order(max_handles: usize) -> impl Strategy<Value = Vec<usize>> {
    (1..=max_handles.max(1))
        .prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
}

/// Generates a single open outcome, mostly successes.
pub fn arb_open_step() -> impl Strategy<Value = OpenStep> {
    prop_oneof![
        6 => Just(OpenStep::Succeed),
        2 => Just(OpenStep::Fail),
        1 => Just(OpenStep::Panic),
    ]
}

/// Generates a script of up to `max_len` open outcomes.
pub fn arb_open_script(max_len: usize) -> impl Strategy<Value = Vec<OpenStep>> {
    prop::collection::vec(arb_open_step(), 0..=max_len)
}
