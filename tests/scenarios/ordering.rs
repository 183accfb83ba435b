//! Scenario: Emitting a schema whose entities reference each other
//!
//! Journey: Deals reference contacts, contacts reference companies. The
//! declaration order in the file should not matter.
//!
//! Success Criteria:
//! - Every artifact of a referencing entity follows every artifact of the
//!   entity it references
//! - Declaration order does not change the output

use strata::{CompileOutput, CompilePipeline, SpecBundle, Target};

use crate::common::*;

fn positions(output: &CompileOutput, entity: &str) -> Vec<usize> {
    output
        .artifacts
        .iter()
        .enumerate()
        .filter(|(_, a)| a.entity() == Some(entity))
        .map(|(i, _)| i)
        .collect()
}

fn assert_after(output: &CompileOutput, later: &str, earlier: &str) {
    let last_earlier = positions(output, earlier).into_iter().max().unwrap();
    let first_later = positions(output, later).into_iter().min().unwrap();
    assert!(
        first_later > last_earlier,
        "{} artifacts start at {} but {} artifacts end at {}",
        later,
        first_later,
        earlier,
        last_earlier
    );
}

fn permutations(bundle: &SpecBundle) -> Vec<SpecBundle> {
    let n = bundle.entities.len();
    let mut out = Vec::new();
    for a in 0..n {
        for b in 0..n {
            for c in 0..n {
                if a == b || b == c || a == c {
                    continue;
                }
                let mut shuffled = bundle.clone();
                shuffled.entities = vec![
                    bundle.entities[a].clone(),
                    bundle.entities[b].clone(),
                    bundle.entities[c].clone(),
                ];
                out.push(shuffled);
            }
        }
    }
    out
}

/// SCENARIO: Referenced entities come first in every declaration order
#[test]
fn scenario_dependency_ordering() {
    let base = bundle("crm");
    assert_eq!(base.entities.len(), 3);
    let pipeline = CompilePipeline::default();
    let expected = pipeline.run(&base).unwrap().script(Target::Postgres);

    for shuffled in permutations(&base) {
        for _ in 0..2 {
            let output = pipeline.run(&shuffled).unwrap();
            assert_after(&output, "Contact", "Company");
            assert_after(&output, "Deal", "Contact");
            assert_eq!(output.script(Target::Postgres), expected);
        }
    }
}
