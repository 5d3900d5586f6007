//! Non-determinism witnesses: sibling transitions competing out of the same
//! state are grouped by an equivalence signature, and each group of two or
//! more yields a formula that is satisfiable exactly when two members can be
//! enabled at once.

use dafsm_domain::*;
use rustc_hash::FxHashMap;

/// A transition prepared for formula composition: its lowered precondition
/// plus the solver bindings of its input parameters.
#[derive(Debug, PartialEq, Clone)]
pub struct PreparedTransition {
    pub transition_id: String,
    pub action_label: String,
    pub caller_name: String,
    pub caller_roles: Vec<Role>,
    /// Introduces participants beyond those supplied via input parameters.
    pub introduces_beyond_input: bool,
    pub pre: Formula,
    pub inputs: Vec<TypedVar>,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
enum Signature {
    Label(String),
    LabelWithRoles(String, Vec<Role>),
    /// Participant-introducing transitions are never mutually exclusive with
    /// same-label siblings by construction.
    Introducing(String),
}

fn signature(t: &PreparedTransition) -> Signature {
    if t.caller_name.trim().is_empty() {
        Signature::Label(t.action_label.clone())
    } else if t.introduces_beyond_input {
        Signature::Introducing(t.action_label.clone())
    } else if !t.caller_roles.is_empty() {
        let mut roles = t.caller_roles.clone();
        roles.sort();
        Signature::LabelWithRoles(t.action_label.clone(), roles)
    } else {
        Signature::Label(t.action_label.clone())
    }
}

#[derive(Debug, Default)]
pub struct NonDeterminismAnalyzer {
    cache: FxHashMap<StateName, Formula>,
}

impl NonDeterminismAnalyzer {
    pub fn new() -> NonDeterminismAnalyzer {
        NonDeterminismAnalyzer::default()
    }

    /// Witness formula for the outgoing set of `transition.to`. Computed once
    /// per target state and shared by every call site entering it; the cache
    /// lives for one verification run.
    pub fn determinism_formula(
        &mut self,
        transition: &Transition,
        siblings: &[PreparedTransition],
    ) -> Formula {
        if let Some(cached) = self.cache.get(&transition.to) {
            return cached.clone();
        }
        let formula = witness(siblings);
        self.cache.insert(transition.to.clone(), formula.clone());
        formula
    }
}

/// For every signature group of size two or more, assert for each member that
/// its precondition does *not* force all competitors off. Disjoined over all
/// members; the empty witness is the always-false formula.
fn witness(siblings: &[PreparedTransition]) -> Formula {
    let mut groups: Vec<(Signature, Vec<usize>)> = Vec::new();
    for (i, s) in siblings.iter().enumerate() {
        let sig = signature(s);
        match groups.iter_mut().find(|(g, _)| *g == sig) {
            Some((_, members)) => members.push(i),
            None => groups.push((sig, vec![i])),
        }
    }

    let mut clauses = Vec::new();
    for (_, members) in &groups {
        if members.len() < 2 {
            continue;
        }
        for &i in members {
            let others: Vec<Formula> = members
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| siblings[j].pre.clone().negate())
                .collect();
            clauses.push(
                Formula::implies(siblings[i].pre.clone(), Formula::and(others)).negate(),
            );
        }
    }
    Formula::or(clauses)
}
