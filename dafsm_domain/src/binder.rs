//! Variable binding for verification conditions: `_old` pre-state
//! correlation between a transition's precondition and postcondition, and
//! lowering of the assertion macro forms against the declared type table.

use super::*;
use std::collections::BTreeSet;

/// Reserved element variable referenced by `exist`/`forall` macro bodies.
pub const ITEM_VAR: &str = "item";

/// Suffix marking the pre-transition value of an updated variable.
pub const OLD_SUFFIX: &str = "_old";

pub fn old_name(name: &str) -> String {
    format!("{name}{OLD_SUFFIX}")
}

pub fn is_old_name(name: &str) -> bool {
    name.len() > OLD_SUFFIX.len() && name.ends_with(OLD_SUFFIX)
}

pub fn base_name(name: &str) -> &str {
    if is_old_name(name) {
        &name[..name.len() - OLD_SUFFIX.len()]
    } else {
        name
    }
}

/// Per-run symbol table for quantified macro bodies, keyed by a monotone
/// counter. Cleared at run start; exists for diagnostics and reporting.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct QuantifierRegistry {
    counter: usize,
    bodies: Vec<(String, Formula)>,
}

impl QuantifierRegistry {
    pub fn new() -> QuantifierRegistry {
        QuantifierRegistry::default()
    }

    pub fn clear(&mut self) {
        self.counter = 0;
        self.bodies.clear();
    }

    pub fn register(&mut self, body: Formula) -> String {
        let key = format!("formula_{}", self.counter);
        self.counter += 1;
        self.bodies.push((key.clone(), body));
        key
    }

    pub fn bodies(&self) -> &[(String, Formula)] {
        &self.bodies
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

/// Preconditions must only reference pre-state values directly.
pub fn check_precondition_fresh(pre: &Formula) -> Result<()> {
    for v in pre.support() {
        if is_old_name(&v) {
            return Err(DafsmError::StaleVariableReference(v));
        }
    }
    Ok(())
}

/// All `_old` variables mentioned by a formula.
pub fn old_variables(f: &Formula) -> Vec<String> {
    f.support().into_iter().filter(|v| is_old_name(v)).collect()
}

/// Rewrite a postcondition so that every right-hand reference to a variable
/// assigned anywhere in the same postcondition reads the `_old` pre-state
/// value. Returns the rewritten assignments and the set of assigned
/// variables. Only targets present in the type table participate, and
/// left-hand sides are left untouched.
pub fn normalize_postcondition(
    assignments: &[Assignment],
    table: &TypeTable,
) -> (Vec<Assignment>, BTreeSet<String>) {
    let assigned: BTreeSet<String> = assignments
        .iter()
        .filter(|a| table.contains_key(a.target.base()))
        .map(|a| a.target.base().to_string())
        .collect();
    let rename = |v: &str| assigned.contains(v).then(|| old_name(v));
    let rewritten = assignments
        .iter()
        .map(|a| {
            let value = match &a.value {
                AssignValue::Term(t) => AssignValue::Term(rename_vars_term(t, &rename)),
                AssignValue::Formula(f) => AssignValue::Formula(rename_vars(f, &rename)),
            };
            Assignment::new(a.target.clone(), value)
        })
        .collect();
    (rewritten, assigned)
}

/// The postcondition expressed as one equality conjunction over the
/// post-state; the empty postcondition is trivially true.
pub fn postcondition_equalities(assignments: &[Assignment]) -> Formula {
    Formula::and(assignments.iter().map(|a| a.to_equality()).collect())
}

/// Rewrite a precondition for use in a pre+post hypothesis: references to
/// variables updated by the postcondition become their `_old` variants.
/// Returns the rewritten formula and the `_old` names it introduced.
pub fn rewrite_pre_with_old(pre: &Formula, assigned: &BTreeSet<String>) -> (Formula, Vec<String>) {
    let renamed = rename_vars(pre, &|v| assigned.contains(v).then(|| old_name(v)));
    let olds = old_variables(&renamed);
    (renamed, olds)
}

/// Apply a variable renaming, leaving quantifier-bound names alone.
pub fn rename_vars(f: &Formula, rename: &dyn Fn(&str) -> Option<String>) -> Formula {
    let mut bound = BTreeSet::new();
    rename_f(f, rename, &mut bound)
}

pub fn rename_vars_term(t: &Term, rename: &dyn Fn(&str) -> Option<String>) -> Term {
    let bound = BTreeSet::new();
    rename_t(t, rename, &bound)
}

fn rename_f(
    f: &Formula,
    rename: &dyn Fn(&str) -> Option<String>,
    bound: &mut BTreeSet<String>,
) -> Formula {
    match f {
        Formula::TRUE => Formula::TRUE,
        Formula::FALSE => Formula::FALSE,
        Formula::AND(xs) => Formula::AND(xs.iter().map(|x| rename_f(x, rename, bound)).collect()),
        Formula::OR(xs) => Formula::OR(xs.iter().map(|x| rename_f(x, rename, bound)).collect()),
        Formula::NOT(x) => Formula::NOT(Box::new(rename_f(x, rename, bound))),
        Formula::IMPLIES(a, b) => Formula::IMPLIES(
            Box::new(rename_f(a, rename, bound)),
            Box::new(rename_f(b, rename, bound)),
        ),
        Formula::IFF(a, b) => Formula::IFF(
            Box::new(rename_f(a, rename, bound)),
            Box::new(rename_f(b, rename, bound)),
        ),
        Formula::EQ(a, b) => Formula::EQ(rename_t(a, rename, bound), rename_t(b, rename, bound)),
        Formula::NEQ(a, b) => Formula::NEQ(rename_t(a, rename, bound), rename_t(b, rename, bound)),
        Formula::LT(a, b) => Formula::LT(rename_t(a, rename, bound), rename_t(b, rename, bound)),
        Formula::LE(a, b) => Formula::LE(rename_t(a, rename, bound), rename_t(b, rename, bound)),
        Formula::GT(a, b) => Formula::GT(rename_t(a, rename, bound), rename_t(b, rename, bound)),
        Formula::GE(a, b) => Formula::GE(rename_t(a, rename, bound), rename_t(b, rename, bound)),
        Formula::MEMBER(a, b) => {
            Formula::MEMBER(rename_t(a, rename, bound), rename_t(b, rename, bound))
        }
        Formula::EXISTS(vs, body) => {
            let fresh: Vec<_> = vs
                .iter()
                .filter(|v| bound.insert(v.name.clone()))
                .map(|v| v.name.clone())
                .collect();
            let inner = rename_f(body, rename, bound);
            for name in fresh {
                bound.remove(&name);
            }
            Formula::EXISTS(vs.clone(), Box::new(inner))
        }
        Formula::FORALL(vs, body) => {
            let fresh: Vec<_> = vs
                .iter()
                .filter(|v| bound.insert(v.name.clone()))
                .map(|v| v.name.clone())
                .collect();
            let inner = rename_f(body, rename, bound);
            for name in fresh {
                bound.remove(&name);
            }
            Formula::FORALL(vs.clone(), Box::new(inner))
        }
    }
}

fn rename_t(t: &Term, rename: &dyn Fn(&str) -> Option<String>, bound: &BTreeSet<String>) -> Term {
    match t {
        Term::Value(v) => Term::Value(v.clone()),
        Term::Var(v) => {
            if bound.contains(v) {
                Term::Var(v.clone())
            } else {
                match rename(v) {
                    Some(n) => Term::Var(n),
                    None => Term::Var(v.clone()),
                }
            }
        }
        Term::Add(a, b) => Term::Add(
            Box::new(rename_t(a, rename, bound)),
            Box::new(rename_t(b, rename, bound)),
        ),
        Term::Sub(a, b) => Term::Sub(
            Box::new(rename_t(a, rename, bound)),
            Box::new(rename_t(b, rename, bound)),
        ),
        Term::Mul(a, b) => Term::Mul(
            Box::new(rename_t(a, rename, bound)),
            Box::new(rename_t(b, rename, bound)),
        ),
        Term::Div(a, b) => Term::Div(
            Box::new(rename_t(a, rename, bound)),
            Box::new(rename_t(b, rename, bound)),
        ),
        Term::Select(a, b) => Term::Select(
            Box::new(rename_t(a, rename, bound)),
            Box::new(rename_t(b, rename, bound)),
        ),
        Term::SumBounded(a, n) => Term::SumBounded(Box::new(rename_t(a, rename, bound)), *n),
    }
}

/// Resolve macro-introduced bound variables against the type table, register
/// quantified bodies, and verify every variable reference is declared.
/// `_old` references resolve through their base name.
pub fn lower(
    f: &Formula,
    scope: &TypeTable,
    registry: &mut QuantifierRegistry,
) -> Result<Formula> {
    let mut bound = BTreeSet::new();
    lower_f(f, scope, registry, &mut bound)
}

fn lower_f(
    f: &Formula,
    scope: &TypeTable,
    registry: &mut QuantifierRegistry,
    bound: &mut BTreeSet<String>,
) -> Result<Formula> {
    match f {
        Formula::TRUE => Ok(Formula::TRUE),
        Formula::FALSE => Ok(Formula::FALSE),
        Formula::AND(xs) => {
            let ys = xs
                .iter()
                .map(|x| lower_f(x, scope, registry, bound))
                .collect::<Result<Vec<_>>>()?;
            Ok(Formula::AND(ys))
        }
        Formula::OR(xs) => {
            let ys = xs
                .iter()
                .map(|x| lower_f(x, scope, registry, bound))
                .collect::<Result<Vec<_>>>()?;
            Ok(Formula::OR(ys))
        }
        Formula::NOT(x) => Ok(Formula::NOT(Box::new(lower_f(x, scope, registry, bound)?))),
        Formula::IMPLIES(a, b) => Ok(Formula::IMPLIES(
            Box::new(lower_f(a, scope, registry, bound)?),
            Box::new(lower_f(b, scope, registry, bound)?),
        )),
        Formula::IFF(a, b) => Ok(Formula::IFF(
            Box::new(lower_f(a, scope, registry, bound)?),
            Box::new(lower_f(b, scope, registry, bound)?),
        )),
        Formula::EQ(a, b)
        | Formula::NEQ(a, b)
        | Formula::LT(a, b)
        | Formula::LE(a, b)
        | Formula::GT(a, b)
        | Formula::GE(a, b)
        | Formula::MEMBER(a, b) => {
            validate_term(a, scope, bound)?;
            validate_term(b, scope, bound)?;
            Ok(f.clone())
        }
        Formula::EXISTS(vs, body) | Formula::FORALL(vs, body) => {
            let mut resolved = Vec::with_capacity(vs.len());
            for v in vs {
                let ty = if v.ty == SpecValueType::Unknown {
                    element_type(body, &v.name, scope)?
                } else {
                    v.ty.clone()
                };
                resolved.push(TypedVar::new(&v.name, ty));
            }
            let fresh: Vec<_> = resolved
                .iter()
                .filter(|v| bound.insert(v.name.clone()))
                .map(|v| v.name.clone())
                .collect();
            let inner = lower_f(body, scope, registry, bound);
            for name in fresh {
                bound.remove(&name);
            }
            let inner = inner?;
            registry.register(inner.clone());
            Ok(match f {
                Formula::EXISTS(..) => Formula::EXISTS(resolved, Box::new(inner)),
                _ => Formula::FORALL(resolved, Box::new(inner)),
            })
        }
    }
}

/// The element type of the collection a macro-bound variable ranges over,
/// found through its `in(var, xs)` guard.
fn element_type(body: &Formula, var: &str, scope: &TypeTable) -> Result<SpecValueType> {
    let collection = find_member_collection(body, var)
        .ok_or_else(|| DafsmError::UnresolvedVariable(var.to_string()))?;
    match collection {
        Term::Var(name) => match scope.get(name) {
            Some(SpecValueType::Array(elem)) => Ok((**elem).clone()),
            Some(_) | None => Err(DafsmError::UnresolvedVariable(name.clone())),
        },
        Term::Value(SpecValue::Array(t, _)) => Ok(t.clone()),
        _ => Err(DafsmError::UnresolvedVariable(var.to_string())),
    }
}

fn find_member_collection<'f>(f: &'f Formula, var: &str) -> Option<&'f Term> {
    match f {
        Formula::MEMBER(Term::Var(v), coll) if v == var => Some(coll),
        Formula::AND(xs) | Formula::OR(xs) => {
            xs.iter().find_map(|x| find_member_collection(x, var))
        }
        Formula::NOT(x) => find_member_collection(x, var),
        Formula::IMPLIES(a, b) | Formula::IFF(a, b) => {
            find_member_collection(a, var).or_else(|| find_member_collection(b, var))
        }
        Formula::EXISTS(_, body) | Formula::FORALL(_, body) => find_member_collection(body, var),
        _ => None,
    }
}

fn validate_term(t: &Term, scope: &TypeTable, bound: &BTreeSet<String>) -> Result<()> {
    match t {
        Term::Value(_) => Ok(()),
        Term::Var(v) => {
            if bound.contains(v) || scope.contains_key(v) || scope.contains_key(base_name(v)) {
                Ok(())
            } else {
                Err(DafsmError::UnresolvedVariable(v.clone()))
            }
        }
        Term::Add(a, b) | Term::Sub(a, b) | Term::Mul(a, b) | Term::Div(a, b)
        | Term::Select(a, b) => {
            validate_term(a, scope, bound)?;
            validate_term(b, scope, bound)
        }
        Term::SumBounded(a, _) => validate_term(a, scope, bound),
    }
}

#[cfg(test)]
mod binder_tests {
    use super::*;
    use crate::parser::{parse_assertion, parse_postcondition};

    fn table(src: &str) -> TypeTable {
        Declarations::parse(src).unwrap().type_table()
    }

    #[test]
    fn postcondition_old_round_trip() {
        // `int x := 5` with `x := x + 1`: the right-hand reference reads the
        // pre-transition value, the left-hand side stays post-state.
        let t = table("int x := 5");
        let post = parse_postcondition("x := x + 1").unwrap();
        let (norm, assigned) = normalize_postcondition(&post, &t);
        assert_eq!(assigned.iter().collect::<Vec<_>>(), vec!["x"]);
        assert_eq!(
            norm[0],
            Assignment::new(
                AssignTarget::Var("x".into()),
                AssignValue::Term(Term::Add(
                    Box::new(Term::var("x_old")),
                    Box::new(Term::value(1i64))
                )),
            )
        );
        // spelling the pre-state reference explicitly is a fixpoint
        let post = parse_postcondition("x := x_old + 1").unwrap();
        let (norm2, _) = normalize_postcondition(&post, &t);
        assert_eq!(norm, norm2);
    }

    #[test]
    fn cross_assignment_references_become_old() {
        let t = table("int x; int y");
        let post = parse_postcondition("x := y & y := x").unwrap();
        let (norm, _) = normalize_postcondition(&post, &t);
        assert_eq!(
            postcondition_equalities(&norm),
            Formula::AND(vec![
                Formula::EQ(Term::var("x"), Term::var("y_old")),
                Formula::EQ(Term::var("y"), Term::var("x_old")),
            ])
        );
    }

    #[test]
    fn undeclared_targets_are_not_rewritten() {
        let t = table("int x");
        let post = parse_postcondition("ghost := ghost + 1").unwrap();
        let (norm, assigned) = normalize_postcondition(&post, &t);
        assert!(assigned.is_empty());
        assert_eq!(norm, post);
    }

    #[test]
    fn stale_precondition_rejected() {
        let pre = parse_assertion("x_old > 0").unwrap();
        assert_eq!(
            check_precondition_fresh(&pre),
            Err(DafsmError::StaleVariableReference("x_old".to_string()))
        );
        let pre = parse_assertion("x > 0").unwrap();
        assert!(check_precondition_fresh(&pre).is_ok());
    }

    #[test]
    fn pre_rewrite_introduces_old_bindings() {
        let pre = parse_assertion("x > 0 && y == 2").unwrap();
        let assigned: BTreeSet<String> = ["x".to_string()].into_iter().collect();
        let (rewritten, olds) = rewrite_pre_with_old(&pre, &assigned);
        assert_eq!(
            rewritten,
            Formula::AND(vec![
                Formula::GT(Term::var("x_old"), Term::value(0i64)),
                Formula::EQ(Term::var("y"), Term::value(2i64)),
            ])
        );
        assert_eq!(olds, vec!["x_old"]);
    }

    #[test]
    fn lower_resolves_macro_element_type() {
        let t = table("array int bids; int x");
        let mut reg = QuantifierRegistry::new();
        let f = parse_assertion("exist(bids, item > x)").unwrap();
        let lowered = lower(&f, &t, &mut reg).unwrap();
        match lowered {
            Formula::EXISTS(vs, _) => {
                assert_eq!(vs, vec![TypedVar::int("item")]);
            }
            other => panic!("expected EXISTS, got {other}"),
        }
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.bodies()[0].0, "formula_0");
    }

    #[test]
    fn lower_rejects_undeclared_variables() {
        let t = table("int x");
        let mut reg = QuantifierRegistry::new();
        let f = parse_assertion("x > y").unwrap();
        assert_eq!(
            lower(&f, &t, &mut reg),
            Err(DafsmError::UnresolvedVariable("y".to_string()))
        );
        // `_old` references resolve through their base name
        let f = parse_assertion("x_old > 0").unwrap();
        assert!(lower(&f, &t, &mut reg).is_ok());
    }

    #[test]
    fn registry_counter_is_monotone() {
        let mut reg = QuantifierRegistry::new();
        assert_eq!(reg.register(Formula::TRUE), "formula_0");
        assert_eq!(reg.register(Formula::FALSE), "formula_1");
        reg.clear();
        assert_eq!(reg.register(Formula::TRUE), "formula_0");
    }
}
