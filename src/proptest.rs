//! Proptest strategies for generating braids.

use ::proptest::collection::{vec, SizeRange};
use ::proptest::strategy::Strategy;

use crate::Braid;

/// A strategy producing a [`Braid`] whose elements are drawn from
/// `element` and whose length falls in `len`.
///
/// ```
/// use proptest::prelude::any;
/// use proptest::strategy::{Strategy, ValueTree};
/// use proptest::test_runner::TestRunner;
///
/// let mut runner = TestRunner::default();
/// let tree = braid::proptest::braid(any::<u32>(), 0..100usize)
///     .new_tree(&mut runner)
///     .unwrap();
/// assert!(tree.current().len() < 100);
/// ```
pub fn braid<S: Strategy>(
    element: S,
    len: impl Into<SizeRange>,
) -> impl Strategy<Value = Braid<S::Value>>
where
    S::Value: Clone,
{
    vec(element, len).prop_map(|values| values.into_iter().collect())
}
