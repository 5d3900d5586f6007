//! The DAFSM domain: specification model, formula algebra and binding layer.

pub mod value;
pub use value::*;

pub mod variable;
pub use variable::*;

pub mod formula;
pub use formula::*;

pub mod parser;

pub mod binder;
pub use binder::*;

pub mod spec;
pub use spec::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A state identifier. The distinguished start state is `"_"`.
pub type StateName = String;

/// A role tag carried by participants.
pub type Role = String;

pub type Result<T> = std::result::Result<T, DafsmError>;

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Error)]
pub enum DafsmError {
    /// A transition's caller map must hold exactly one entry.
    #[error("transition `{0}` must declare exactly one caller")]
    MalformedCaller(String),
    /// Preconditions may only reference pre-state values directly.
    #[error("precondition references pre-update variable `{0}`")]
    StaleVariableReference(String),
    /// A condition mentions a variable missing from the declared type table.
    #[error("variable `{0}` is not declared")]
    UnresolvedVariable(String),
    #[error("state `{0}` is not declared in the specification")]
    UnknownState(String),
    #[error("cannot parse `{src}`: {msg}")]
    Parse { src: String, msg: String },
    #[error("solver boundary failure: {0}")]
    Solver(String),
}

impl DafsmError {
    pub fn parse(src: &str, msg: impl std::fmt::Display) -> DafsmError {
        DafsmError::Parse {
            src: src.to_string(),
            msg: msg.to_string(),
        }
    }
}

impl From<serde_json::Error> for DafsmError {
    fn from(e: serde_json::Error) -> Self {
        DafsmError::Parse {
            src: "json".to_string(),
            msg: e.to_string(),
        }
    }
}
