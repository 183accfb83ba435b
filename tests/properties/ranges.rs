//! Property tests for range overlap.

use proptest::prelude::*;

use strata::domain::patterns::non_overlapping_range::Span;

fn span() -> impl Strategy<Value = Span<i32>> {
    (proptest::option::of(-50i32..50), proptest::option::of(-50i32..50)).prop_map(|(a, b)| {
        match (a, b) {
            (Some(a), Some(b)) if a > b => Span::new(Some(b), Some(a)),
            (a, b) => Span::new(a, b),
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: Overlap is symmetric under both bound styles.
    #[test]
    fn property_overlap_symmetric(a in span(), b in span(), inclusive in any::<bool>()) {
        prop_assert_eq!(a.overlaps(&b, inclusive), b.overlaps(&a, inclusive));
    }

    /// PROPERTY: Half-open neighbours never overlap; closed ones always do.
    #[test]
    fn property_adjacent_ranges(start in -50i32..0, middle in 0i32..50, len in 1i32..50) {
        let left = Span::new(Some(start), Some(middle));
        let right = Span::new(Some(middle), Some(middle + len));
        prop_assert!(!left.overlaps(&right, false));
        prop_assert!(left.overlaps(&right, true));
    }

    /// PROPERTY: Two ranges holding a common point overlap.
    #[test]
    fn property_shared_point_overlaps(
        x in -50i32..50,
        below in 0i32..20,
        above in 1i32..20,
        below2 in 0i32..20,
        above2 in 1i32..20,
    ) {
        let a = Span::new(Some(x - below), Some(x + above));
        let b = Span::new(Some(x - below2), Some(x + above2));
        prop_assert!(a.overlaps(&b, false));
    }

    /// PROPERTY: An unbounded range overlaps every ordered range.
    #[test]
    fn property_unbounded_overlaps_everything(b in span()) {
        let all: Span<i32> = Span::new(None, None);
        prop_assume!(b.is_ordered(true));
        prop_assert!(all.overlaps(&b, false));
    }
}
