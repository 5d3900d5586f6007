//! The solver boundary. The engine only ever asks one question — is this
//! formula satisfiable — through the [`Solver`] trait; the shipped backend
//! serializes the formula to an SMT-LIB2 script and runs an external `z3`
//! process, scanning its stdout for the verdict token.

use dafsm_domain::*;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Satisfiability {
    Sat,
    Unsat,
    Unknown,
}

pub trait Solver {
    fn check_satisfiable(
        &mut self,
        bindings: &[TypedVar],
        formula: &Formula,
    ) -> Result<Satisfiability>;

    fn simplify(&mut self, formula: &Formula) -> Formula {
        formula.clone()
    }

    /// Diagnostic model text from the most recent satisfiable check.
    fn model(&mut self) -> Option<String> {
        None
    }
}

pub struct Z3ScriptSolver {
    binary: PathBuf,
    produce_models: bool,
    last_model: Option<String>,
}

impl Z3ScriptSolver {
    /// Find `z3` on the search path.
    pub fn locate() -> Result<Z3ScriptSolver> {
        let binary =
            which::which("z3").map_err(|e| DafsmError::Solver(format!("z3 not found: {e}")))?;
        Ok(Z3ScriptSolver::with_binary(binary))
    }

    pub fn with_binary(binary: PathBuf) -> Z3ScriptSolver {
        Z3ScriptSolver {
            binary,
            produce_models: false,
            last_model: None,
        }
    }

    /// Ask the solver for a model on satisfiable checks, for diagnostics.
    pub fn produce_models(mut self, enable: bool) -> Z3ScriptSolver {
        self.produce_models = enable;
        self
    }
}

impl Solver for Z3ScriptSolver {
    fn check_satisfiable(
        &mut self,
        bindings: &[TypedVar],
        formula: &Formula,
    ) -> Result<Satisfiability> {
        self.last_model = None;
        // constant formulas never spawn a process
        if let Some(value) = formula.const_eval() {
            return Ok(if value {
                Satisfiability::Sat
            } else {
                Satisfiability::Unsat
            });
        }

        let script = smt_script(bindings, formula, self.produce_models)?;
        let mut file = tempfile::Builder::new()
            .prefix("dafsm_vc_")
            .suffix(".smt2")
            .tempfile()
            .map_err(|e| DafsmError::Solver(format!("cannot create solver script: {e}")))?;
        file.write_all(script.as_bytes())
            .map_err(|e| DafsmError::Solver(format!("cannot write solver script: {e}")))?;

        let output = Command::new(&self.binary)
            .arg("-smt2")
            .arg(file.path())
            .output()
            .map_err(|e| DafsmError::Solver(format!("cannot run solver: {e}")))?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        let mut lines = stdout.lines();
        while let Some(line) = lines.next() {
            match line.trim() {
                "sat" => {
                    if self.produce_models {
                        let rest: Vec<&str> = lines.by_ref().collect();
                        self.last_model = Some(rest.join("\n"));
                    }
                    return Ok(Satisfiability::Sat);
                }
                "unsat" => return Ok(Satisfiability::Unsat),
                "unknown" => return Ok(Satisfiability::Unknown),
                _ => {}
            }
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(DafsmError::Solver(format!(
            "no verdict in solver output: {stdout}{stderr}"
        )))
    }

    fn model(&mut self) -> Option<String> {
        self.last_model.clone()
    }
}

/// A full SMT-LIB2 script asserting the formula over the given bindings.
pub fn smt_script(bindings: &[TypedVar], formula: &Formula, produce_models: bool) -> Result<String> {
    let mut script = String::from("(set-logic ALL)\n");
    if produce_models {
        script.push_str("(set-option :produce-models true)\n");
    }
    let mut declared: Vec<&str> = Vec::new();
    for v in bindings {
        if declared.contains(&v.name.as_str()) {
            continue;
        }
        declared.push(&v.name);
        script.push_str(&format!("(declare-const {} {})\n", v.name, smt_sort(&v.ty)?));
    }
    script.push_str(&format!("(assert {})\n", smt_formula(formula)?));
    script.push_str("(check-sat)\n");
    if produce_models {
        script.push_str("(get-model)\n");
    }
    Ok(script)
}

fn smt_sort(ty: &SpecValueType) -> Result<String> {
    Ok(match ty {
        SpecValueType::Bool => "Bool".to_string(),
        SpecValueType::Int => "Int".to_string(),
        SpecValueType::Float => "Real".to_string(),
        SpecValueType::String => "String".to_string(),
        SpecValueType::Array(elem) => format!("(Array Int {})", smt_sort(elem)?),
        // participants appear at most as opaque identities
        SpecValueType::Participant(_) => "String".to_string(),
        SpecValueType::Unknown => {
            return Err(DafsmError::Solver(
                "cannot emit a sort for an unresolved type".to_string(),
            ))
        }
    })
}

fn smt_value(v: &SpecValue) -> Result<String> {
    Ok(match v {
        SpecValue::Bool(b) => b.to_string(),
        SpecValue::Int(i) => {
            if *i < 0 {
                format!("(- {})", i.unsigned_abs())
            } else {
                i.to_string()
            }
        }
        SpecValue::Float(x) => {
            if *x < 0.0 {
                format!("(- {:?})", -x)
            } else {
                format!("{x:?}")
            }
        }
        SpecValue::String(s) => format!("\"{}\"", s.replace('"', "\"\"")),
        SpecValue::Array(..) | SpecValue::Unknown => {
            return Err(DafsmError::Solver(format!(
                "cannot emit literal value {v}"
            )))
        }
    })
}

fn smt_term(t: &Term) -> Result<String> {
    Ok(match t {
        Term::Value(v) => smt_value(v)?,
        Term::Var(v) => v.clone(),
        Term::Add(a, b) => format!("(+ {} {})", smt_term(a)?, smt_term(b)?),
        Term::Sub(a, b) => format!("(- {} {})", smt_term(a)?, smt_term(b)?),
        Term::Mul(a, b) => format!("(* {} {})", smt_term(a)?, smt_term(b)?),
        Term::Div(a, b) => format!("(div {} {})", smt_term(a)?, smt_term(b)?),
        Term::Select(a, i) => format!("(select {} {})", smt_term(a)?, smt_term(i)?),
        Term::SumBounded(a, n) => {
            if *n <= 0 {
                "0".to_string()
            } else if *n == 1 {
                format!("(select {} 0)", smt_term(a)?)
            } else {
                let array = smt_term(a)?;
                let cells: Vec<String> =
                    (0..*n).map(|i| format!("(select {array} {i})")).collect();
                format!("(+ {})", cells.join(" "))
            }
        }
    })
}

fn smt_formula(f: &Formula) -> Result<String> {
    Ok(match f {
        Formula::TRUE => "true".to_string(),
        Formula::FALSE => "false".to_string(),
        Formula::AND(xs) => nary("and", xs, "true")?,
        Formula::OR(xs) => nary("or", xs, "false")?,
        Formula::NOT(x) => format!("(not {})", smt_formula(x)?),
        Formula::IMPLIES(a, b) => format!("(=> {} {})", smt_formula(a)?, smt_formula(b)?),
        Formula::IFF(a, b) => format!("(= {} {})", smt_formula(a)?, smt_formula(b)?),
        Formula::EQ(a, b) => format!("(= {} {})", smt_term(a)?, smt_term(b)?),
        Formula::NEQ(a, b) => format!("(not (= {} {}))", smt_term(a)?, smt_term(b)?),
        Formula::LT(a, b) => format!("(< {} {})", smt_term(a)?, smt_term(b)?),
        Formula::LE(a, b) => format!("(<= {} {})", smt_term(a)?, smt_term(b)?),
        Formula::GT(a, b) => format!("(> {} {})", smt_term(a)?, smt_term(b)?),
        Formula::GE(a, b) => format!("(>= {} {})", smt_term(a)?, smt_term(b)?),
        Formula::MEMBER(x, xs) => format!(
            "(exists ((mem_idx Int)) (= (select {} mem_idx) {}))",
            smt_term(xs)?,
            smt_term(x)?
        ),
        Formula::EXISTS(vs, body) => quantified("exists", vs, body)?,
        Formula::FORALL(vs, body) => quantified("forall", vs, body)?,
    })
}

fn nary(op: &str, xs: &[Formula], unit: &str) -> Result<String> {
    match xs.len() {
        0 => Ok(unit.to_string()),
        1 => smt_formula(&xs[0]),
        _ => {
            let parts = xs.iter().map(smt_formula).collect::<Result<Vec<_>>>()?;
            Ok(format!("({op} {})", parts.join(" ")))
        }
    }
}

fn quantified(op: &str, vs: &[TypedVar], body: &Formula) -> Result<String> {
    if vs.is_empty() {
        return smt_formula(body);
    }
    let binders = vs
        .iter()
        .map(|v| Ok(format!("({} {})", v.name, smt_sort(&v.ty)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("({op} ({}) {})", binders.join(" "), smt_formula(body)?))
}
