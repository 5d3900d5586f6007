//! Surface grammars for the condition languages carried by a specification:
//! typed declaration lists, boolean assertions (with the `in`/`sum`/`exist`/
//! `forall` macro forms) and postcondition assignment lists.

use super::*;

/// Parse a precondition / assertion. An empty source is trivially true.
pub fn parse_assertion(src: &str) -> Result<Formula> {
    let trimmed = src.trim();
    if trimmed.is_empty() {
        return Ok(Formula::TRUE);
    }
    cond_parser::formula(trimmed).map_err(|e| DafsmError::parse(src, e))
}

/// Parse a postcondition: `&`-separated `target := expr` updates.
pub fn parse_postcondition(src: &str) -> Result<Vec<Assignment>> {
    if src.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for piece in src.split('&') {
        let piece = piece.trim();
        if piece.is_empty() {
            return Err(DafsmError::parse(src, "empty assignment"));
        }
        out.push(cond_parser::assignment(piece).map_err(|e| DafsmError::parse(piece, e))?);
    }
    Ok(out)
}

/// Parse one entry of a declaration list (already split on `;`/`,`).
pub fn declaration(piece: &str) -> Result<DeclEntry> {
    cond_parser::declaration(piece).map_err(|e| DafsmError::parse(piece, e))
}

peg::parser! {
    pub grammar cond_parser() for str {
        rule _() = quiet!{[' ' | '\t' | '\r' | '\n']*}
        rule ws() = quiet!{[' ' | '\t']+}
        rule ident_char() = ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']

        rule ident() -> String
            = quiet!{ s:$(['a'..='z' | 'A'..='Z' | '_'] ident_char()*) { s.to_string() } }
            / expected!("identifier")

        rule int_lit() -> i64
            = s:$("-"? ['0'..='9']+) {? s.parse().or(Err("integer")) }

        rule float_lit() -> f64
            = s:$("-"? ['0'..='9']+ "." ['0'..='9']+) {? s.parse().or(Err("float")) }

        rule string_lit() -> String
            = "\"" s:$((!"\"" [_])*) "\"" { s.to_string() }

        rule literal() -> SpecValue
            = f:float_lit() { SpecValue::Float(f) }
            / i:int_lit() { SpecValue::Int(i) }
            / ("true" / "True") !ident_char() { SpecValue::Bool(true) }
            / ("false" / "False") !ident_char() { SpecValue::Bool(false) }
            / s:string_lit() { SpecValue::String(s) }

        // ---- terms ----

        pub rule term() -> Term = add_term()

        rule add_term() -> Term
            = l:mul_term() rest:(_ op:$("+" / "-") _ r:mul_term() { (op, r) })* {
                let mut t = l;
                for (op, r) in rest {
                    t = match op {
                        "+" => Term::Add(Box::new(t), Box::new(r)),
                        _ => Term::Sub(Box::new(t), Box::new(r)),
                    };
                }
                t
            }

        rule mul_term() -> Term
            = l:atom_term() rest:(_ op:$("*" / "/") _ r:atom_term() { (op, r) })* {
                let mut t = l;
                for (op, r) in rest {
                    t = match op {
                        "*" => Term::Mul(Box::new(t), Box::new(r)),
                        _ => Term::Div(Box::new(t), Box::new(r)),
                    };
                }
                t
            }

        rule atom_term() -> Term
            = v:literal() { Term::Value(v) }
            / sum_term()
            / i:ident() _ "[" _ t:term() _ "]" {
                Term::Select(Box::new(Term::Var(i)), Box::new(t))
            }
            / i:ident() { Term::Var(i) }
            / "(" _ t:term() _ ")" { t }

        // `sum(xs)` sums the first 100 cells; a malformed bound falls back
        // to 2, matching the reference checker's defaults.
        rule sum_term() -> Term
            = "sum" _ "(" _ a:term() b:(_ "," _ t:term() { t })? _ ")" {
                let bound = match b {
                    None => 100,
                    Some(Term::Value(SpecValue::Int(n))) if n > 0 => n,
                    Some(_) => 2,
                };
                Term::SumBounded(Box::new(a), bound)
            }

        // ---- formulas ----

        pub rule formula() -> Formula = _ f:imp_expr() _ { f }

        rule imp_expr() -> Formula
            = l:or_expr() r:(_ "->" _ x:imp_expr() { x })? {
                match r {
                    Some(x) => Formula::implies(l, x),
                    None => l,
                }
            }

        rule or_expr() -> Formula
            = xs:(and_expr() ++ (_ "||" _)) { Formula::or(xs) }

        rule and_expr() -> Formula
            = xs:(not_expr() ++ (_ ("&&" / "&") _)) { Formula::and(xs) }

        rule not_expr() -> Formula
            = "!" _ f:not_expr() { f.negate() }
            / primary()

        rule primary() -> Formula
            = ("True" / "true") !ident_char() { Formula::TRUE }
            / ("False" / "false") !ident_char() { Formula::FALSE }
            / "And" _ "(" _ xs:(imp_expr() ** (_ "," _)) _ ")" { Formula::and(xs) }
            / "Or" _ "(" _ xs:(imp_expr() ** (_ "," _)) _ ")" { Formula::or(xs) }
            / "Not" _ "(" _ f:imp_expr() _ ")" { f.negate() }
            / "Implies" _ "(" _ a:imp_expr() _ "," _ b:imp_expr() _ ")" {
                Formula::implies(a, b)
            }
            / "in" _ "(" _ x:term() _ "," _ xs:term() _ ")" { Formula::MEMBER(x, xs) }
            / "exist" _ "(" _ xs:term() _ "," _ body:imp_expr() _ ")" {
                Formula::EXISTS(
                    vec![TypedVar::new(binder::ITEM_VAR, SpecValueType::Unknown)],
                    Box::new(Formula::and(vec![
                        Formula::MEMBER(Term::var(binder::ITEM_VAR), xs),
                        body,
                    ])),
                )
            }
            / "forall" _ "(" _ xs:term() _ "," _ body:imp_expr() _ ")" {
                Formula::FORALL(
                    vec![TypedVar::new(binder::ITEM_VAR, SpecValueType::Unknown)],
                    Box::new(Formula::implies(
                        Formula::MEMBER(Term::var(binder::ITEM_VAR), xs),
                        body,
                    )),
                )
            }
            / comparison()
            / "(" _ f:imp_expr() _ ")" { f }
            / i:ident() { Formula::bool_var(&i) }

        rule comparison() -> Formula
            = l:term() _ op:$("==" / "!=" / "<=" / ">=" / "<" / ">") _ r:term() {
                match op {
                    "==" => Formula::EQ(l, r),
                    "!=" => Formula::NEQ(l, r),
                    "<=" => Formula::LE(l, r),
                    ">=" => Formula::GE(l, r),
                    "<" => Formula::LT(l, r),
                    _ => Formula::GT(l, r),
                }
            }

        // ---- postcondition assignments ----

        pub rule assignment() -> Assignment
            = _ t:assign_target() _ ":=" _ v:assign_value() _ ![_] {
                Assignment::new(t, v)
            }

        rule assign_target() -> AssignTarget
            = i:ident() _ "[" _ t:term() _ "]" { AssignTarget::Index(i, t) }
            / i:ident() { AssignTarget::Var(i) }

        rule assign_value() -> AssignValue
            = t:term() _ ![_] { AssignValue::Term(t) }
            / f:imp_expr() { AssignValue::Formula(f) }

        // ---- declarations ----

        pub rule declaration() -> DeclEntry
            = _ "participant" ws() role:ident() ws() name:ident() _ ![_] {
                DeclEntry::Participant { name, role }
            }
            / _ ("array" / "set") ws() elem:type_name() ws() name:ident() _ ![_] {
                DeclEntry::Var {
                    var: TypedVar::new(&name, SpecValueType::Array(Box::new(elem))),
                    initial: None,
                }
            }
            / _ t:type_name() ws() name:ident() init:(_ ":=" _ v:init_value() { v })? _ ![_] {
                DeclEntry::Var {
                    var: TypedVar::new(&name, t),
                    initial: init,
                }
            }

        rule type_name() -> SpecValueType
            = "int" !ident_char() { SpecValueType::Int }
            / "string" !ident_char() { SpecValueType::String }
            / "float" !ident_char() { SpecValueType::Float }
            / "bool" !ident_char() { SpecValueType::Bool }

        rule init_value() -> SpecValue
            = v:literal() { v }
            / w:ident() { SpecValue::String(w) }
    }
}

#[cfg(test)]
mod parser_tests {
    use super::*;

    #[test]
    fn comparisons_and_connectives() {
        let f = parse_assertion("x > 0 && y <= 10").unwrap();
        assert_eq!(
            f,
            Formula::AND(vec![
                Formula::GT(Term::var("x"), Term::value(0i64)),
                Formula::LE(Term::var("y"), Term::value(10i64)),
            ])
        );

        let f = parse_assertion("x == 1 || !done").unwrap();
        assert_eq!(
            f,
            Formula::OR(vec![
                Formula::EQ(Term::var("x"), Term::value(1i64)),
                Formula::bool_var("done").negate(),
            ])
        );
    }

    #[test]
    fn function_style_connectives() {
        let f = parse_assertion("And(x > 0, Not(y == 2))").unwrap();
        assert_eq!(
            f,
            Formula::AND(vec![
                Formula::GT(Term::var("x"), Term::value(0i64)),
                Formula::EQ(Term::var("y"), Term::value(2i64)).negate(),
            ])
        );

        let f = parse_assertion("Implies(x > 0, y > 0)").unwrap();
        assert_eq!(
            f,
            Formula::implies(
                Formula::GT(Term::var("x"), Term::value(0i64)),
                Formula::GT(Term::var("y"), Term::value(0i64)),
            )
        );
    }

    #[test]
    fn implication_arrow_is_right_associative() {
        let f = parse_assertion("a -> b -> c").unwrap();
        assert_eq!(
            f,
            Formula::implies(
                Formula::bool_var("a"),
                Formula::implies(Formula::bool_var("b"), Formula::bool_var("c")),
            )
        );
    }

    #[test]
    fn arithmetic_precedence() {
        let f = parse_assertion("x + 2 * y == 10").unwrap();
        assert_eq!(
            f,
            Formula::EQ(
                Term::Add(
                    Box::new(Term::var("x")),
                    Box::new(Term::Mul(
                        Box::new(Term::value(2i64)),
                        Box::new(Term::var("y"))
                    )),
                ),
                Term::value(10i64),
            )
        );
    }

    #[test]
    fn membership_and_sum_macros() {
        let f = parse_assertion("in(winner, bidders)").unwrap();
        assert_eq!(f, Formula::MEMBER(Term::var("winner"), Term::var("bidders")));

        let f = parse_assertion("sum(bids, 5) > total").unwrap();
        assert_eq!(
            f,
            Formula::GT(
                Term::SumBounded(Box::new(Term::var("bids")), 5),
                Term::var("total"),
            )
        );

        // defaulted and malformed bounds, as in the reference checker
        assert_eq!(
            parse_assertion("sum(bids) > 0").unwrap(),
            Formula::GT(
                Term::SumBounded(Box::new(Term::var("bids")), 100),
                Term::value(0i64),
            )
        );
        assert_eq!(
            parse_assertion("sum(bids, 0) > 0").unwrap(),
            Formula::GT(
                Term::SumBounded(Box::new(Term::var("bids")), 2),
                Term::value(0i64),
            )
        );
    }

    #[test]
    fn exist_macro_binds_item() {
        let f = parse_assertion("exist(bids, item > 10)").unwrap();
        assert_eq!(
            f,
            Formula::EXISTS(
                vec![TypedVar::new("item", SpecValueType::Unknown)],
                Box::new(Formula::AND(vec![
                    Formula::MEMBER(Term::var("item"), Term::var("bids")),
                    Formula::GT(Term::var("item"), Term::value(10i64)),
                ])),
            )
        );
    }

    #[test]
    fn postcondition_assignments() {
        let ps = parse_postcondition("x := x + 1 & xs[0] := 5").unwrap();
        assert_eq!(
            ps,
            vec![
                Assignment::new(
                    AssignTarget::Var("x".into()),
                    AssignValue::Term(Term::Add(
                        Box::new(Term::var("x")),
                        Box::new(Term::value(1i64))
                    )),
                ),
                Assignment::new(
                    AssignTarget::Index("xs".into(), Term::value(0i64)),
                    AssignValue::Term(Term::value(5i64)),
                ),
            ]
        );
    }

    #[test]
    fn boolean_valued_assignment() {
        let ps = parse_postcondition("closed := x > 10").unwrap();
        assert_eq!(
            ps,
            vec![Assignment::new(
                AssignTarget::Var("closed".into()),
                AssignValue::Formula(Formula::GT(Term::var("x"), Term::value(10i64))),
            )]
        );
    }

    #[test]
    fn empty_sources() {
        assert_eq!(parse_assertion("  ").unwrap(), Formula::TRUE);
        assert_eq!(parse_postcondition("").unwrap(), vec![]);
        assert!(parse_postcondition("x := 1 & ").is_err());
    }

    #[test]
    fn identifiers_do_not_shadow_keywords() {
        // `input`, `summary` and `existing` are ordinary variables
        let f = parse_assertion("input > 0 && summary == 2 && existing").unwrap();
        assert_eq!(
            f,
            Formula::AND(vec![
                Formula::GT(Term::var("input"), Term::value(0i64)),
                Formula::EQ(Term::var("summary"), Term::value(2i64)),
                Formula::bool_var("existing"),
            ])
        );
    }
}
