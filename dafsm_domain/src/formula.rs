/// The solver-agnostic formula algebra. Verification conditions are built
/// from these terms and handed to a solver boundary; nothing in here decides
/// satisfiability beyond constant folding.
use super::*;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub enum Term {
    Value(SpecValue),
    Var(String),
    Add(Box<Term>, Box<Term>),
    Sub(Box<Term>, Box<Term>),
    Mul(Box<Term>, Box<Term>),
    Div(Box<Term>, Box<Term>),
    /// Array element read, `xs[i]`.
    Select(Box<Term>, Box<Term>),
    /// Bounded summation over the first `n` cells of an array.
    SumBounded(Box<Term>, i64),
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub enum Formula {
    TRUE,
    FALSE,
    AND(Vec<Formula>),
    OR(Vec<Formula>),
    NOT(Box<Formula>),
    IMPLIES(Box<Formula>, Box<Formula>),
    /// Boolean equivalence, used for boolean-valued postcondition updates.
    IFF(Box<Formula>, Box<Formula>),
    EQ(Term, Term),
    NEQ(Term, Term),
    LT(Term, Term),
    LE(Term, Term),
    GT(Term, Term),
    GE(Term, Term),
    /// Collection membership, `in(x, xs)`.
    MEMBER(Term, Term),
    EXISTS(Vec<TypedVar>, Box<Formula>),
    FORALL(Vec<TypedVar>, Box<Formula>),
}

impl Term {
    pub fn var(name: &str) -> Term {
        Term::Var(name.to_string())
    }

    pub fn value(v: impl ToSpecValue) -> Term {
        Term::Value(v.to_value())
    }

    fn support_into(&self, s: &mut BTreeSet<String>) {
        match self {
            Term::Value(_) => {}
            Term::Var(v) => {
                s.insert(v.clone());
            }
            Term::Add(a, b) | Term::Sub(a, b) | Term::Mul(a, b) | Term::Div(a, b)
            | Term::Select(a, b) => {
                a.support_into(s);
                b.support_into(s);
            }
            Term::SumBounded(a, _) => a.support_into(s),
        }
    }
}

impl Formula {
    /// Conjunction with the usual units folded away.
    pub fn and(xs: Vec<Formula>) -> Formula {
        let mut kept: Vec<Formula> = Vec::new();
        for x in xs {
            match x {
                Formula::TRUE => {}
                Formula::FALSE => return Formula::FALSE,
                f => kept.push(f),
            }
        }
        match kept.len() {
            0 => Formula::TRUE,
            1 => kept.remove(0),
            _ => Formula::AND(kept),
        }
    }

    /// Disjunction; the empty disjunction is the always-false formula.
    pub fn or(xs: Vec<Formula>) -> Formula {
        let mut kept: Vec<Formula> = Vec::new();
        for x in xs {
            match x {
                Formula::FALSE => {}
                Formula::TRUE => return Formula::TRUE,
                f => kept.push(f),
            }
        }
        match kept.len() {
            0 => Formula::FALSE,
            1 => kept.remove(0),
            _ => Formula::OR(kept),
        }
    }

    pub fn negate(self) -> Formula {
        Formula::NOT(Box::new(self))
    }

    pub fn implies(hypothesis: Formula, thesis: Formula) -> Formula {
        Formula::IMPLIES(Box::new(hypothesis), Box::new(thesis))
    }

    /// An identifier used as a bare boolean atom.
    pub fn bool_var(name: &str) -> Formula {
        Formula::EQ(Term::var(name), Term::Value(SpecValue::Bool(true)))
    }

    /// Every variable mentioned anywhere in the formula, including quantified
    /// occurrences, sorted and deduplicated.
    pub fn support(&self) -> Vec<String> {
        let mut s = BTreeSet::new();
        self.support_into(&mut s);
        s.into_iter().collect()
    }

    /// Variables not captured by a quantifier binding.
    pub fn free_vars(&self) -> Vec<String> {
        let mut s = BTreeSet::new();
        let mut bound = BTreeSet::new();
        self.free_into(&mut s, &mut bound);
        s.into_iter().collect()
    }

    fn support_into(&self, s: &mut BTreeSet<String>) {
        match self {
            Formula::TRUE | Formula::FALSE => {}
            Formula::AND(xs) | Formula::OR(xs) => xs.iter().for_each(|f| f.support_into(s)),
            Formula::NOT(f) => f.support_into(s),
            Formula::IMPLIES(a, b) | Formula::IFF(a, b) => {
                a.support_into(s);
                b.support_into(s);
            }
            Formula::EQ(a, b)
            | Formula::NEQ(a, b)
            | Formula::LT(a, b)
            | Formula::LE(a, b)
            | Formula::GT(a, b)
            | Formula::GE(a, b)
            | Formula::MEMBER(a, b) => {
                a.support_into(s);
                b.support_into(s);
            }
            Formula::EXISTS(vs, f) | Formula::FORALL(vs, f) => {
                for v in vs {
                    s.insert(v.name.clone());
                }
                f.support_into(s);
            }
        }
    }

    fn free_into(&self, s: &mut BTreeSet<String>, bound: &mut BTreeSet<String>) {
        match self {
            Formula::EXISTS(vs, f) | Formula::FORALL(vs, f) => {
                let fresh: Vec<_> = vs
                    .iter()
                    .filter(|v| bound.insert(v.name.clone()))
                    .map(|v| v.name.clone())
                    .collect();
                f.free_into(s, bound);
                for name in fresh {
                    bound.remove(&name);
                }
            }
            _ => {
                let mut all = BTreeSet::new();
                match self {
                    Formula::AND(xs) | Formula::OR(xs) => {
                        xs.iter().for_each(|f| f.free_into(s, bound));
                        return;
                    }
                    Formula::NOT(f) => {
                        f.free_into(s, bound);
                        return;
                    }
                    Formula::IMPLIES(a, b) | Formula::IFF(a, b) => {
                        a.free_into(s, bound);
                        b.free_into(s, bound);
                        return;
                    }
                    other => other.support_into(&mut all),
                }
                for v in all {
                    if !bound.contains(&v) {
                        s.insert(v);
                    }
                }
            }
        }
    }

    /// Constant folding. Trivially decided verification conditions (empty
    /// determinism groups, final-state consistency) never reach the solver.
    pub fn const_eval(&self) -> Option<bool> {
        match self {
            Formula::TRUE => Some(true),
            Formula::FALSE => Some(false),
            Formula::AND(xs) => {
                let mut all_true = true;
                for x in xs {
                    match x.const_eval() {
                        Some(false) => return Some(false),
                        Some(true) => {}
                        None => all_true = false,
                    }
                }
                if all_true {
                    Some(true)
                } else {
                    None
                }
            }
            Formula::OR(xs) => {
                let mut all_false = true;
                for x in xs {
                    match x.const_eval() {
                        Some(true) => return Some(true),
                        Some(false) => {}
                        None => all_false = false,
                    }
                }
                if all_false {
                    Some(false)
                } else {
                    None
                }
            }
            Formula::NOT(f) => f.const_eval().map(|b| !b),
            Formula::IMPLIES(a, b) => match (a.const_eval(), b.const_eval()) {
                (Some(false), _) | (_, Some(true)) => Some(true),
                (Some(true), Some(false)) => Some(false),
                _ => None,
            },
            Formula::IFF(a, b) => match (a.const_eval(), b.const_eval()) {
                (Some(x), Some(y)) => Some(x == y),
                _ => None,
            },
            Formula::EQ(Term::Value(a), Term::Value(b)) => Some(a == b),
            Formula::NEQ(Term::Value(a), Term::Value(b)) => Some(a != b),
            Formula::EXISTS(_, f) | Formula::FORALL(_, f) => f.const_eval(),
            _ => None,
        }
    }
}

/// The left-hand side of a postcondition update.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub enum AssignTarget {
    Var(String),
    Index(String, Term),
}

impl AssignTarget {
    pub fn base(&self) -> &str {
        match self {
            AssignTarget::Var(v) => v,
            AssignTarget::Index(v, _) => v,
        }
    }

    pub fn to_term(&self) -> Term {
        match self {
            AssignTarget::Var(v) => Term::Var(v.clone()),
            AssignTarget::Index(v, i) => {
                Term::Select(Box::new(Term::Var(v.clone())), Box::new(i.clone()))
            }
        }
    }
}

/// The right-hand side of a postcondition update; boolean-valued updates
/// carry a formula.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub enum AssignValue {
    Term(Term),
    Formula(Formula),
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct Assignment {
    pub target: AssignTarget,
    pub value: AssignValue,
}

impl Assignment {
    pub fn new(target: AssignTarget, value: AssignValue) -> Assignment {
        Assignment { target, value }
    }

    /// The update expressed as an equality over the post-state.
    pub fn to_equality(&self) -> Formula {
        match &self.value {
            AssignValue::Term(t) => Formula::EQ(self.target.to_term(), t.clone()),
            AssignValue::Formula(f) => Formula::IFF(
                Box::new(Formula::EQ(
                    self.target.to_term(),
                    Term::Value(SpecValue::Bool(true)),
                )),
                Box::new(f.clone()),
            ),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Value(v) => write!(fmtr, "{v}"),
            Term::Var(v) => write!(fmtr, "{v}"),
            Term::Add(a, b) => write!(fmtr, "({a} + {b})"),
            Term::Sub(a, b) => write!(fmtr, "({a} - {b})"),
            Term::Mul(a, b) => write!(fmtr, "({a} * {b})"),
            Term::Div(a, b) => write!(fmtr, "({a} / {b})"),
            Term::Select(a, i) => write!(fmtr, "{a}[{i}]"),
            Term::SumBounded(a, n) => write!(fmtr, "sum({a}, {n})"),
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: String = match self {
            Formula::TRUE => "TRUE".into(),
            Formula::FALSE => "FALSE".into(),
            Formula::AND(xs) => {
                let children: Vec<_> = xs.iter().map(|p| format!("{p}")).collect();
                format!("({})", children.join(" && "))
            }
            Formula::OR(xs) => {
                let children: Vec<_> = xs.iter().map(|p| format!("{p}")).collect();
                format!("({})", children.join(" || "))
            }
            Formula::NOT(p) => format!("!({p})"),
            Formula::IMPLIES(a, b) => format!("({a} -> {b})"),
            Formula::IFF(a, b) => format!("({a} <-> {b})"),
            Formula::EQ(x, y) => format!("{x} == {y}"),
            Formula::NEQ(x, y) => format!("{x} != {y}"),
            Formula::LT(x, y) => format!("{x} < {y}"),
            Formula::LE(x, y) => format!("{x} <= {y}"),
            Formula::GT(x, y) => format!("{x} > {y}"),
            Formula::GE(x, y) => format!("{x} >= {y}"),
            Formula::MEMBER(x, y) => format!("in({x}, {y})"),
            Formula::EXISTS(vs, f) => {
                let names: Vec<_> = vs.iter().map(|v| v.name.clone()).collect();
                format!("exist [{}] ({f})", names.join(","))
            }
            Formula::FORALL(vs, f) => {
                let names: Vec<_> = vs.iter().map(|v| v.name.clone()).collect();
                format!("forall [{}] ({f})", names.join(","))
            }
        };
        write!(fmtr, "{}", &s)
    }
}

impl Default for Formula {
    fn default() -> Self {
        Formula::TRUE
    }
}

#[cfg(test)]
mod formula_tests {
    use super::*;

    #[test]
    fn smart_constructors_fold_units() {
        assert_eq!(Formula::and(vec![]), Formula::TRUE);
        assert_eq!(Formula::or(vec![]), Formula::FALSE);
        assert_eq!(
            Formula::and(vec![Formula::TRUE, Formula::bool_var("x")]),
            Formula::bool_var("x")
        );
        assert_eq!(
            Formula::or(vec![Formula::bool_var("x"), Formula::TRUE]),
            Formula::TRUE
        );
    }

    #[test]
    fn support_collects_sorted_names() {
        let f = Formula::AND(vec![
            Formula::GT(Term::var("b"), Term::value(0i64)),
            Formula::EQ(Term::var("a"), Term::var("c")),
        ]);
        assert_eq!(f.support(), vec!["a", "b", "c"]);
    }

    #[test]
    fn free_vars_skip_quantified() {
        let f = Formula::EXISTS(
            vec![TypedVar::int("i")],
            Box::new(Formula::EQ(
                Term::Select(Box::new(Term::var("xs")), Box::new(Term::var("i"))),
                Term::var("y"),
            )),
        );
        assert_eq!(f.free_vars(), vec!["xs", "y"]);
    }

    #[test]
    fn const_eval_folds_verification_shapes() {
        // final state consistency: Not(Implies(h, True)) is always false
        let f = Formula::implies(Formula::bool_var("h"), Formula::TRUE).negate();
        assert_eq!(f.const_eval(), Some(false));
        // empty determinism group
        assert_eq!(Formula::or(vec![]).const_eval(), Some(false));
        // undecidable without a solver
        let f = Formula::GT(Term::var("x"), Term::value(0i64));
        assert_eq!(f.const_eval(), None);
    }

    #[test]
    fn equality_of_boolean_update() {
        let a = Assignment::new(
            AssignTarget::Var("done".into()),
            AssignValue::Formula(Formula::bool_var("ready")),
        );
        assert_eq!(
            a.to_equality(),
            Formula::IFF(
                Box::new(Formula::bool_var("done")),
                Box::new(Formula::bool_var("ready"))
            )
        );
    }
}
