//! Property tests for the expression parser.

use proptest::prelude::*;

use strata::domain::actions::{BinaryOp, Expr};

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "null", "true", "false", "now", "lower", "upper", "coalesce",
];

fn name() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z][a-z0-9_]{0,12}")
        .unwrap()
        .prop_filter("must not be a keyword", |s| !KEYWORDS.contains(&s.as_str()))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: Parsing never panics on arbitrary input.
    #[test]
    fn property_parse_never_panics(s in "(?s).{0,256}") {
        let _ = Expr::parse(&s);
    }

    /// PROPERTY: Parsing never panics on operator soup.
    #[test]
    fn property_parse_never_panics_on_tokens(s in "[a-z0-9$_.,()'<>=! ]{0,64}") {
        if let Err(e) = Expr::parse(&s) {
            prop_assert!(e.offset <= s.len());
        }
    }

    /// PROPERTY: `name = n` is an equality on one unresolved path.
    #[test]
    fn property_comparison_parses(field in name(), n in 0i64..1_000_000) {
        let expr = Expr::parse(&format!("{} = {}", field, n)).unwrap();
        let is_eq = matches!(expr, Expr::Binary { op: BinaryOp::Eq, .. });
        prop_assert!(is_eq);
        let expected = [field];
        prop_assert_eq!(expr.paths(), vec![&expected[..]]);
    }

    /// PROPERTY: Dotted names keep every segment.
    #[test]
    fn property_dotted_paths(a in name(), b in name()) {
        let expr = Expr::parse(&format!("{}.{} in ('x', 'y')", a, b)).unwrap();
        let expected = [a, b];
        prop_assert_eq!(expr.paths(), vec![&expected[..]]);
    }

    /// PROPERTY: Whitespace around tokens does not matter.
    #[test]
    fn property_whitespace_insensitive(field in name(), pad in " {0,4}") {
        let tight = Expr::parse(&format!("{}>1 and {}<9", field, field)).unwrap();
        let loose = Expr::parse(&format!("{p}{f}{p}>{p}1 and {f}{p}<{p}9{p}", p = pad, f = field)).unwrap();
        prop_assert_eq!(tight, loose);
    }
}
