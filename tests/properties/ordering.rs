//! Property tests for artifact ordering.

use proptest::prelude::*;

use strata::domain::entities::{EntityDecl, FieldDecl};
use strata::{CompileOutput, CompilePipeline, SpecBundle, Target};

/// Entity `E<i>` references `E<j>` for each `j` in `refs[i]`, always `j < i`.
fn references() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (2usize..6).prop_flat_map(|n| {
        (0..n)
            .map(|i| proptest::sample::subsequence((0..i).collect::<Vec<_>>(), 0..=i))
            .collect::<Vec<_>>()
    })
}

fn bundle(refs: &[Vec<usize>], order: &[usize]) -> SpecBundle {
    let mut bundle = SpecBundle::new("generated");
    for &i in order {
        let mut entity = EntityDecl::new(format!("E{}", i), "app")
            .field(FieldDecl::new("label", "text"));
        for j in &refs[i] {
            entity = entity.field(FieldDecl::new(&format!("r{}", j), &format!("ref(E{})", j)));
        }
        bundle = bundle.with_entity(entity);
    }
    bundle
}

fn span(output: &CompileOutput, entity: &str) -> (usize, usize) {
    let positions: Vec<usize> = output
        .artifacts
        .iter()
        .enumerate()
        .filter(|(_, a)| a.entity() == Some(entity))
        .map(|(i, _)| i)
        .collect();
    (positions[0], positions[positions.len() - 1])
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: A referencing entity's artifacts all follow the referenced
    /// entity's, whatever the declaration order.
    #[test]
    fn property_references_emitted_first(
        (refs, order) in references().prop_flat_map(|refs| {
            let n = refs.len();
            (Just(refs), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
        })
    ) {
        let pipeline = CompilePipeline::default();
        let output = pipeline.run(&bundle(&refs, &order)).unwrap();

        for (i, targets) in refs.iter().enumerate() {
            for j in targets {
                let (first_later, _) = span(&output, &format!("E{}", i));
                let (_, last_earlier) = span(&output, &format!("E{}", j));
                prop_assert!(first_later > last_earlier, "E{} must follow E{}", i, j);
            }
        }

        let declared: Vec<usize> = (0..refs.len()).collect();
        let canonical = pipeline.run(&bundle(&refs, &declared)).unwrap();
        prop_assert_eq!(output.script(Target::Postgres), canonical.script(Target::Postgres));
    }
}
