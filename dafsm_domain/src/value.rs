use super::*;
use std::fmt;

/// A concrete value in a DAFSM specification.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub enum SpecValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(SpecValueType, Vec<SpecValue>),
    Unknown,
}

#[derive(Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Clone)]
pub enum SpecValueType {
    Bool,
    Int,
    Float,
    String,
    Array(Box<SpecValueType>),
    /// A participant binding carrying its role tag. Participants never become
    /// solver variables.
    Participant(Role),
    Unknown,
}

impl SpecValue {
    pub fn value_type(&self) -> SpecValueType {
        match self {
            SpecValue::Bool(_) => SpecValueType::Bool,
            SpecValue::Int(_) => SpecValueType::Int,
            SpecValue::Float(_) => SpecValueType::Float,
            SpecValue::String(_) => SpecValueType::String,
            SpecValue::Array(t, _) => SpecValueType::Array(Box::new(t.clone())),
            SpecValue::Unknown => SpecValueType::Unknown,
        }
    }
}

pub trait ToSpecValue {
    fn to_value(&self) -> SpecValue;
}

impl ToSpecValue for bool {
    fn to_value(&self) -> SpecValue {
        SpecValue::Bool(*self)
    }
}

impl ToSpecValue for i64 {
    fn to_value(&self) -> SpecValue {
        SpecValue::Int(*self)
    }
}

impl ToSpecValue for i32 {
    fn to_value(&self) -> SpecValue {
        SpecValue::Int((*self).into())
    }
}

impl ToSpecValue for f64 {
    fn to_value(&self) -> SpecValue {
        SpecValue::Float(*self)
    }
}

impl ToSpecValue for &str {
    fn to_value(&self) -> SpecValue {
        SpecValue::String((*self).to_string())
    }
}

impl ToSpecValue for String {
    fn to_value(&self) -> SpecValue {
        SpecValue::String(self.clone())
    }
}

impl fmt::Display for SpecValue {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecValue::Bool(b) => write!(fmtr, "{b}"),
            SpecValue::Int(i) => write!(fmtr, "{i}"),
            SpecValue::Float(x) => write!(fmtr, "{x}"),
            SpecValue::String(s) => write!(fmtr, "\"{s}\""),
            SpecValue::Array(_, xs) => {
                let items: Vec<_> = xs.iter().map(|x| format!("{x}")).collect();
                write!(fmtr, "[{}]", items.join(", "))
            }
            SpecValue::Unknown => write!(fmtr, "?"),
        }
    }
}

impl fmt::Display for SpecValueType {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecValueType::Bool => write!(fmtr, "bool"),
            SpecValueType::Int => write!(fmtr, "int"),
            SpecValueType::Float => write!(fmtr, "float"),
            SpecValueType::String => write!(fmtr, "string"),
            SpecValueType::Array(t) => write!(fmtr, "array {t}"),
            SpecValueType::Participant(r) => write!(fmtr, "participant {r}"),
            SpecValueType::Unknown => write!(fmtr, "unknown"),
        }
    }
}
