//! The per-run driver: walks every transition of a prepared specification,
//! assembles its three verification conditions and evaluates them against
//! the solver boundary. All mutable state (memo tables, quantifier registry,
//! statistics) is created fresh per run and never shared across models.

use crate::*;
use dafsm_domain::*;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The three verification conditions assembled for one transition, plus the
/// global solver bindings they are checked under.
#[derive(Debug, PartialEq, Clone)]
pub struct TransitionConditions {
    pub transition: String,
    /// TRUE when the caller is proven introduced, FALSE otherwise.
    pub participants: Formula,
    /// Must be unsatisfiable for the transition to be deterministic.
    pub non_determinism: Formula,
    /// Must be unsatisfiable for the transition to be action-consistent.
    pub consistency: Formula,
    /// State variables, input parameters and `_old` pre-state bindings.
    pub bindings: Vec<TypedVar>,
}

pub struct WellFormednessChecker {
    model: SpecModel,
    config: VerifyConfig,
    declarations: Declarations,
    caller_checker: CallerIntroductionChecker,
    non_determinism: NonDeterminismAnalyzer,
    registry: QuantifierRegistry,
    stats: RunStats,
}

impl WellFormednessChecker {
    /// The model must already be prepared ([`SpecModel::prepare`] or
    /// [`SpecModel::from_json`]).
    pub fn new(model: SpecModel, config: VerifyConfig) -> Result<WellFormednessChecker> {
        let declarations = model.declarations()?;
        let caller_checker = CallerIntroductionChecker::new(&model, &config);
        Ok(WellFormednessChecker {
            model,
            config,
            declarations,
            caller_checker,
            non_determinism: NonDeterminismAnalyzer::new(),
            registry: QuantifierRegistry::new(),
            stats: RunStats::new(),
        })
    }

    pub fn model(&self) -> &SpecModel {
        &self.model
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn quantifier_registry(&self) -> &QuantifierRegistry {
        &self.registry
    }

    pub fn configure(&mut self, config: VerifyConfig) {
        self.caller_checker.configure(&config);
        self.config = config;
    }

    /// Verify the whole specification. `Ok(Verdict)` covers every analysis
    /// outcome including solver boundary errors; `Err` is reserved for the
    /// fatal input defects (malformed callers, stale preconditions,
    /// undeclared state variables).
    pub fn run(&mut self, solver: &mut dyn Solver) -> Result<Verdict> {
        self.registry.clear();
        self.stats = RunStats::new();
        let mut failures: Vec<Failure> = Vec::new();

        'transitions: for idx in self.transition_order() {
            let transition = self.model.transitions[idx].clone();
            debug!("checking transition {transition}");

            let conditions = match self.compose_conditions(&transition) {
                Ok(c) => c,
                Err(DafsmError::UnresolvedVariable(v)) => {
                    failures.push(Failure {
                        transition: transition.id(),
                        kind: CheckKind::Consistency,
                        diagnostic: format!("variable `{v}` is not declared"),
                    });
                    if !self.config.non_stop {
                        break 'transitions;
                    }
                    continue;
                }
                Err(fatal) => return Err(fatal),
            };

            if self.config.log_enabled
                && self
                    .caller_checker
                    .graph()
                    .outgoing_transitions(&transition.to)
                    .is_empty()
                && !self.model.is_final(&transition.to)
            {
                warn!(
                    "{} is not a final state but has no outgoing transitions",
                    transition.to
                );
            }

            for failure in self.evaluate(&transition, &conditions, solver) {
                failures.push(failure);
                if !self.config.non_stop {
                    break 'transitions;
                }
            }
        }

        let verdict = if failures.is_empty() {
            Verdict::WellFormed
        } else {
            Verdict::NotWellFormed { failures }
        };
        info!("{verdict}");
        Ok(verdict)
    }

    /// Start-state group first, remaining groups in state order.
    fn transition_order(&self) -> Vec<usize> {
        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, t) in self.model.transitions.iter().enumerate() {
            groups.entry(t.from.as_str()).or_default().push(i);
        }
        let mut order = Vec::with_capacity(self.model.transitions.len());
        if let Some(first) = groups.remove(self.model.initial_state.as_str()) {
            order.extend(first);
        }
        for (_, idxs) in groups {
            order.extend(idxs);
        }
        order
    }

    /// Assemble the three verification conditions for one transition.
    pub fn compose_conditions(&mut self, transition: &Transition) -> Result<TransitionConditions> {
        let started = Instant::now();
        let introduced = self.caller_checker.is_caller_introduced(transition)?;
        self.stats.participants_time += started.elapsed();
        self.stats.paths_visited += self.caller_checker.paths_visited();
        self.stats.timed_out |= self.caller_checker.timed_out();
        let participants = if introduced {
            Formula::TRUE
        } else {
            Formula::FALSE
        };

        let build_started = Instant::now();

        let pre_raw = parser::parse_assertion(&transition.pre_condition)?;
        binder::check_precondition_fresh(&pre_raw)?;
        let post_raw = parser::parse_postcondition(&transition.post_condition)?;

        let params = transition.input_params()?;
        let scope = self.transition_scope(&params);

        let (post_norm, assigned) = binder::normalize_postcondition(&post_raw, &scope);
        let post_eq = binder::lower(
            &binder::postcondition_equalities(&post_norm),
            &scope,
            &mut self.registry,
        )?;
        let (pre_old, _) = binder::rewrite_pre_with_old(&pre_raw, &assigned);
        let pre = binder::lower(&pre_old, &scope, &mut self.registry)?;

        let mut bindings = self.declarations.solver_vars();
        for v in params.vars.iter().filter(|v| !v.is_participant()) {
            push_unique(&mut bindings, v.clone());
        }
        for name in binder::old_variables(&pre)
            .into_iter()
            .chain(binder::old_variables(&post_eq))
        {
            push_old_binding(&mut bindings, &scope, &name)?;
        }

        let siblings = self.prepare_siblings(&transition.to)?;

        let started = Instant::now();
        let non_determinism = self
            .non_determinism
            .determinism_formula(transition, &siblings);
        let nd_elapsed = started.elapsed();
        self.stats.non_determinism_time += nd_elapsed;

        let started = Instant::now();
        let consistency = consistency_formula(&pre, &post_eq, &siblings);
        let cons_elapsed = started.elapsed();
        self.stats.consistency_time += cons_elapsed;

        self.stats.building_time += build_started
            .elapsed()
            .saturating_sub(nd_elapsed + cons_elapsed);

        Ok(TransitionConditions {
            transition: transition.id(),
            participants,
            non_determinism,
            consistency,
            bindings,
        })
    }

    /// State variables plus a transition's own input parameters.
    fn transition_scope(&self, params: &Declarations) -> TypeTable {
        let mut scope = self.declarations.type_table();
        for v in &params.vars {
            scope.insert(v.name.clone(), v.ty.clone());
        }
        for (name, role) in &params.participants {
            scope.insert(name.clone(), SpecValueType::Participant(role.clone()));
        }
        scope
    }

    /// Prepare the outgoing set of `state` for formula composition.
    fn prepare_siblings(&mut self, state: &str) -> Result<Vec<PreparedTransition>> {
        let siblings: Vec<Transition> = self
            .caller_checker
            .graph()
            .outgoing_transitions(state)
            .into_iter()
            .cloned()
            .collect();
        let mut prepared = Vec::with_capacity(siblings.len());
        for sibling in &siblings {
            let params = sibling.input_params()?;
            let scope = self.transition_scope(&params);
            let pre = binder::lower(
                &parser::parse_assertion(&sibling.pre_condition)?,
                &scope,
                &mut self.registry,
            )?;
            let mut inputs: Vec<TypedVar> = Vec::new();
            for v in params.vars.iter().filter(|v| !v.is_participant()) {
                push_unique(&mut inputs, v.clone());
            }
            for name in binder::old_variables(&pre) {
                push_old_binding(&mut inputs, &scope, &name)?;
            }
            let (caller_name, caller_roles) = sibling.caller()?;
            prepared.push(PreparedTransition {
                transition_id: sibling.id(),
                action_label: sibling.action_label.clone(),
                caller_name: caller_name.to_string(),
                caller_roles: caller_roles.to_vec(),
                introduces_beyond_input: sibling.introduces_beyond_input(),
                pre,
                inputs,
            });
        }
        Ok(prepared)
    }

    /// Evaluate one transition's conditions; participants must hold, the two
    /// witnesses must be refuted.
    fn evaluate(
        &self,
        transition: &Transition,
        conditions: &TransitionConditions,
        solver: &mut dyn Solver,
    ) -> Vec<Failure> {
        let mut failures = Vec::new();

        if conditions.participants == Formula::FALSE {
            let caller = transition
                .caller()
                .map(|(name, _)| name.to_string())
                .unwrap_or_default();
            let diagnostic = if self.caller_checker.timed_out() {
                format!("caller-introduction of `{caller}` timed out; not proven")
            } else {
                format!("participant `{caller}` is not introduced on every path")
            };
            failures.push(Failure {
                transition: conditions.transition.clone(),
                kind: CheckKind::Participants,
                diagnostic,
            });
        }

        if let Some(diagnostic) = check_witness(
            solver,
            &conditions.bindings,
            &conditions.non_determinism,
            "two competing transitions can be enabled at once",
        ) {
            failures.push(Failure {
                transition: conditions.transition.clone(),
                kind: CheckKind::NonDeterminism,
                diagnostic,
            });
        }

        if let Some(diagnostic) = check_witness(
            solver,
            &conditions.bindings,
            &conditions.consistency,
            "a reachable state has no enabled outgoing transition",
        ) {
            failures.push(Failure {
                transition: conditions.transition.clone(),
                kind: CheckKind::Consistency,
                diagnostic,
            });
        }

        failures
    }
}

/// A witness formula passes only when proven unsatisfiable. Solver boundary
/// errors fail the transition with the raw diagnostic attached rather than
/// aborting the run.
fn check_witness(
    solver: &mut dyn Solver,
    bindings: &[TypedVar],
    formula: &Formula,
    sat_diagnostic: &str,
) -> Option<String> {
    match formula.const_eval() {
        Some(false) => return None,
        Some(true) => return Some(sat_diagnostic.to_string()),
        None => {}
    }
    match solver.check_satisfiable(bindings, formula) {
        Ok(Satisfiability::Unsat) => None,
        Ok(Satisfiability::Sat) => match solver.model() {
            Some(model) => Some(format!("{sat_diagnostic}; model: {model}")),
            None => Some(sat_diagnostic.to_string()),
        },
        Ok(Satisfiability::Unknown) => Some("not proven: solver returned unknown".to_string()),
        Err(e) => Some(format!("solver boundary error: {e}")),
    }
}

fn push_unique(bindings: &mut Vec<TypedVar>, var: TypedVar) {
    if !bindings.iter().any(|b| b.name == var.name) {
        bindings.push(var);
    }
}

fn push_old_binding(bindings: &mut Vec<TypedVar>, scope: &TypeTable, name: &str) -> Result<()> {
    if bindings.iter().any(|b| b.name == name) {
        return Ok(());
    }
    match scope.get(binder::base_name(name)) {
        Some(ty) => {
            bindings.push(TypedVar::new(name, ty.clone()));
            Ok(())
        }
        None => Err(DafsmError::UnresolvedVariable(name.to_string())),
    }
}
