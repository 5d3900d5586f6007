use super::*;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// A declared variable binding.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TypedVar {
    pub name: String,
    pub ty: SpecValueType,
}

impl TypedVar {
    pub fn new(name: &str, ty: SpecValueType) -> TypedVar {
        TypedVar {
            name: name.to_string(),
            ty,
        }
    }

    pub fn int(name: &str) -> TypedVar {
        TypedVar::new(name, SpecValueType::Int)
    }

    pub fn boolean(name: &str) -> TypedVar {
        TypedVar::new(name, SpecValueType::Bool)
    }

    pub fn is_participant(&self) -> bool {
        matches!(self.ty, SpecValueType::Participant(_))
    }
}

/// Variable name to declared type.
pub type TypeTable = FxHashMap<String, SpecValueType>;

/// The result of parsing a typed declaration list: the solver-facing
/// variables, their initial values, and the participants declared alongside
/// them (participants are tracked out of band, never as solver variables).
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct Declarations {
    pub vars: Vec<TypedVar>,
    pub initials: Vec<(String, SpecValue)>,
    pub participants: BTreeMap<String, Role>,
}

impl Declarations {
    /// Parse a `;`/`,` separated declaration list for the specification's
    /// state variables. Declared names carrying the `_old` suffix are
    /// rejected here: that suffix is reserved for pre-state references.
    pub fn parse(src: &str) -> Result<Declarations> {
        Declarations::parse_inner(src, true)
    }

    /// Parse a transition's input parameter list. The `_old` restriction does
    /// not apply; pre-state bindings are appended to parameter lists during
    /// formula composition.
    pub fn parse_params(src: &str) -> Result<Declarations> {
        Declarations::parse_inner(src, false)
    }

    fn parse_inner(src: &str, reject_old: bool) -> Result<Declarations> {
        let mut decls = Declarations::default();
        for piece in src.split([';', ',']) {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            let entry = parser::declaration(piece)?;
            match entry {
                DeclEntry::Var { var, initial } => {
                    if reject_old && binder::is_old_name(&var.name) {
                        return Err(DafsmError::StaleVariableReference(var.name));
                    }
                    if let Some(v) = initial {
                        decls.initials.push((var.name.clone(), v));
                    }
                    if !decls.vars.iter().any(|d| d.name == var.name) {
                        decls.vars.push(var);
                    }
                }
                DeclEntry::Participant { name, role } => {
                    decls.participants.insert(name, role);
                }
            }
        }
        Ok(decls)
    }

    pub fn type_table(&self) -> TypeTable {
        let mut table = TypeTable::default();
        for v in &self.vars {
            table.insert(v.name.clone(), v.ty.clone());
        }
        for (name, role) in &self.participants {
            table.insert(name.clone(), SpecValueType::Participant(role.clone()));
        }
        table
    }

    /// Parameters that become solver bindings; participants are filtered out.
    pub fn solver_vars(&self) -> Vec<TypedVar> {
        self.vars
            .iter()
            .filter(|v| !v.is_participant())
            .cloned()
            .collect()
    }
}

/// One entry of a declaration list.
#[derive(Debug, PartialEq, Clone)]
pub enum DeclEntry {
    Var {
        var: TypedVar,
        initial: Option<SpecValue>,
    },
    Participant {
        name: String,
        role: Role,
    },
}

#[cfg(test)]
mod declaration_tests {
    use super::*;

    #[test]
    fn parse_mixed_declarations() {
        let d = Declarations::parse("int x := 5; bool done; string tag, participant R1 p1; array int xs").unwrap();
        assert_eq!(
            d.vars,
            vec![
                TypedVar::int("x"),
                TypedVar::boolean("done"),
                TypedVar::new("tag", SpecValueType::String),
                TypedVar::new("xs", SpecValueType::Array(Box::new(SpecValueType::Int))),
            ]
        );
        assert_eq!(d.initials, vec![("x".to_string(), SpecValue::Int(5))]);
        assert_eq!(d.participants.get("p1"), Some(&"R1".to_string()));
    }

    #[test]
    fn duplicate_declaration_keeps_first() {
        let d = Declarations::parse("int x; bool x").unwrap();
        assert_eq!(d.vars, vec![TypedVar::int("x")]);
    }

    #[test]
    fn old_suffix_rejected_for_state_variables() {
        let e = Declarations::parse("int x_old").unwrap_err();
        assert_eq!(e, DafsmError::StaleVariableReference("x_old".to_string()));
        // but fine for parameter lists, which may carry pre-state bindings
        assert!(Declarations::parse_params("int x_old").is_ok());
    }

    #[test]
    fn participant_requires_role() {
        assert!(Declarations::parse("participant p1").is_err());
    }

    #[test]
    fn type_table_includes_participants() {
        let d = Declarations::parse("int x; participant R a").unwrap();
        let table = d.type_table();
        assert_eq!(table.get("x"), Some(&SpecValueType::Int));
        assert_eq!(
            table.get("a"),
            Some(&SpecValueType::Participant("R".to_string()))
        );
        assert_eq!(d.solver_vars(), vec![TypedVar::int("x")]);
    }
}
