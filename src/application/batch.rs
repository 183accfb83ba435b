//! Batch compilation of independent bundles.

use rayon::prelude::*;

use super::compile::{CompileFailure, CompileOutput, CompilePipeline};
use crate::domain::entities::SpecBundle;

/// Compile every bundle on the rayon pool.
///
/// Runs share nothing but the pipeline's configuration, so one failing
/// bundle never affects another. Results come back in input order.
pub fn compile_batch(
    pipeline: &CompilePipeline,
    bundles: &[SpecBundle],
) -> Vec<Result<CompileOutput, CompileFailure>> {
    tracing::debug!(bundles = bundles.len(), "compiling batch");
    bundles.par_iter().map(|bundle| pipeline.run(bundle)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{EntityDecl, FieldDecl};

    fn bundle(unit: &str, entity: &str) -> SpecBundle {
        SpecBundle::new(unit).with_entity(
            EntityDecl::new(entity, "app").field(FieldDecl::new("label", "text").required()),
        )
    }

    #[test]
    fn results_keep_input_order() {
        let pipeline = CompilePipeline::default();
        let bundles: Vec<SpecBundle> = (0..8)
            .map(|i| bundle(&format!("unit_{}", i), &format!("Thing{}", i)))
            .collect();
        let results = compile_batch(&pipeline, &bundles);
        assert_eq!(results.len(), 8);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.as_ref().unwrap().unit, format!("unit_{}", i));
        }
    }

    #[test]
    fn one_failure_does_not_affect_siblings() {
        let pipeline = CompilePipeline::default();
        let broken = SpecBundle::new("broken")
            .with_entity(EntityDecl::new("Bad", "app").field(FieldDecl::new("x", "no_such_type")));
        let bundles = vec![bundle("a", "Alpha"), broken, bundle("b", "Beta")];
        let results = compile_batch(&pipeline, &bundles);
        assert!(results[0].is_ok());
        assert_eq!(results[1].as_ref().unwrap_err().code(), "unknown-type");
        assert!(results[2].is_ok());
    }

    #[test]
    fn parallel_runs_match_sequential_runs() {
        let pipeline = CompilePipeline::default();
        let bundles = vec![bundle("a", "Alpha"), bundle("b", "Beta")];
        let parallel = compile_batch(&pipeline, &bundles);
        for (bundle, result) in bundles.iter().zip(parallel) {
            let sequential = pipeline.run(bundle).unwrap();
            assert_eq!(result.unwrap().fingerprint, sequential.fingerprint);
        }
    }
}
