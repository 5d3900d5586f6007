//! Batch verification of independent specifications. Each model gets its own
//! checker and solver; nothing mutable is shared, so the models verify in
//! parallel.

use crate::*;
use dafsm_domain::*;
use rayon::prelude::*;

pub fn verify_all_with<S, F>(
    models: Vec<SpecModel>,
    config: &VerifyConfig,
    make_solver: F,
) -> Vec<Result<(Verdict, RunStats)>>
where
    S: Solver,
    F: Fn() -> Result<S> + Sync,
{
    models
        .into_par_iter()
        .map(|model| {
            let mut solver = make_solver()?;
            let mut checker = WellFormednessChecker::new(model, config.clone())?;
            let verdict = checker.run(&mut solver)?;
            Ok((verdict, checker.stats().clone()))
        })
        .collect()
}

/// Verify every model against a freshly located `z3` backend.
pub fn verify_all(models: Vec<SpecModel>, config: &VerifyConfig) -> Vec<Result<(Verdict, RunStats)>> {
    verify_all_with(models, config, Z3ScriptSolver::locate)
}

#[cfg(test)]
mod batch_tests {
    use super::*;

    struct AlwaysUnsat;

    impl Solver for AlwaysUnsat {
        fn check_satisfiable(
            &mut self,
            _bindings: &[TypedVar],
            _formula: &Formula,
        ) -> Result<Satisfiability> {
            Ok(Satisfiability::Unsat)
        }
    }

    fn tiny_model(label: &str) -> SpecModel {
        let mut model = SpecModel {
            states: vec!["_".into(), "S0".into()],
            final_states: vec!["S0".into()],
            transitions: vec![Transition::new("_", "S0", label)
                .called_by("p1", &[])
                .introducing("p1", &["R1"])],
            ..SpecModel::default()
        };
        model.prepare().unwrap();
        model
    }

    #[test]
    fn independent_models_verify_in_order() {
        let models = vec![tiny_model("a"), tiny_model("b"), tiny_model("c")];
        let results = verify_all_with(models, &VerifyConfig::default(), || Ok(AlwaysUnsat));
        assert_eq!(results.len(), 3);
        for r in results {
            let (verdict, stats) = r.unwrap();
            assert!(verdict.is_well_formed());
            assert!(!stats.timed_out);
        }
    }
}
