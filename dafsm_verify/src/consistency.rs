//! Action-consistency conditions: taking a transition must leave at least
//! one outgoing transition of the target state satisfiable, otherwise the
//! process can reach a non-final state it never leaves.

use crate::PreparedTransition;
use dafsm_domain::*;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Quantifier {
    Exists,
    ForAll,
}

/// Close a formula over the given variables; the empty binding list is the
/// formula itself.
pub fn quantifier_closure(formula: Formula, vars: Vec<TypedVar>, quantifier: Quantifier) -> Formula {
    if vars.is_empty() {
        return formula;
    }
    match quantifier {
        Quantifier::Exists => Formula::EXISTS(vars, Box::new(formula)),
        Quantifier::ForAll => Formula::FORALL(vars, Box::new(formula)),
    }
}

/// `Not(Implies(And(pre, postEq), Or(Exists(inputs_i, pre_i)...)))`.
///
/// Satisfiability of the result witnesses a state reachable through this
/// transition from which no outgoing transition can ever fire. An empty
/// sibling set makes the thesis trivially true: final states are consistent
/// by construction.
pub fn consistency_formula(
    pre: &Formula,
    post_equalities: &Formula,
    siblings: &[PreparedTransition],
) -> Formula {
    let hypothesis = Formula::and(vec![pre.clone(), post_equalities.clone()]);
    let thesis = if siblings.is_empty() {
        Formula::TRUE
    } else {
        Formula::or(
            siblings
                .iter()
                .map(|s| quantifier_closure(s.pre.clone(), s.inputs.clone(), Quantifier::Exists))
                .collect(),
        )
    };
    Formula::implies(hypothesis, thesis).negate()
}
