//! The structured DAFSM specification consumed by the verifier, deserialized
//! from the persisted camelCase format and normalized before analysis.

use super::*;
use std::collections::BTreeMap;
use std::fmt;

/// The distinguished start state.
pub const START_STATE: &str = "_";

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub from: StateName,
    pub to: StateName,
    pub action_label: String,
    #[serde(default)]
    pub pre_condition: String,
    #[serde(default)]
    pub post_condition: String,
    /// Exactly one entry: the invoking participant and the roles it must
    /// already hold. An empty name means the action has no caller; an empty
    /// role list means any known participant may call.
    #[serde(default)]
    pub caller: BTreeMap<String, Vec<Role>>,
    #[serde(default)]
    pub new_participants: BTreeMap<String, Vec<Role>>,
    /// Typed input parameter declaration list.
    #[serde(default)]
    pub input: String,
    /// Final-state subset carried by the persisted format.
    #[serde(default)]
    pub final_states: Vec<StateName>,
    /// Participants contributed by `input` parameters, filled in by
    /// [`SpecModel::prepare`].
    #[serde(skip)]
    pub participants_from_input: BTreeMap<String, Vec<Role>>,
}

impl Transition {
    pub fn new(from: &str, to: &str, action_label: &str) -> Transition {
        let mut caller = BTreeMap::new();
        caller.insert(String::new(), Vec::new());
        Transition {
            from: from.to_string(),
            to: to.to_string(),
            action_label: action_label.to_string(),
            caller,
            ..Transition::default()
        }
    }

    pub fn pre(mut self, src: &str) -> Transition {
        self.pre_condition = src.to_string();
        self
    }

    pub fn post(mut self, src: &str) -> Transition {
        self.post_condition = src.to_string();
        self
    }

    pub fn with_input(mut self, src: &str) -> Transition {
        self.input = src.to_string();
        self
    }

    pub fn called_by(mut self, name: &str, roles: &[&str]) -> Transition {
        self.caller.clear();
        self.caller
            .insert(name.to_string(), roles.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn introducing(mut self, name: &str, roles: &[&str]) -> Transition {
        self.new_participants
            .insert(name.to_string(), roles.iter().map(|r| r.to_string()).collect());
        self
    }

    /// The single caller entry.
    pub fn caller(&self) -> Result<(&str, &[Role])> {
        match self.caller.iter().next() {
            Some((name, roles)) if self.caller.len() == 1 => {
                Ok((name.as_str(), roles.as_slice()))
            }
            _ => Err(DafsmError::MalformedCaller(self.id())),
        }
    }

    pub fn id(&self) -> String {
        format!("{}_{}_{}", self.from, self.action_label, self.to)
    }

    pub fn input_params(&self) -> Result<Declarations> {
        Declarations::parse_params(&self.input)
    }

    /// Participants this transition introduces beyond those supplied through
    /// its own input parameters.
    pub fn introduces_beyond_input(&self) -> bool {
        self.new_participants
            .keys()
            .any(|k| !self.participants_from_input.contains_key(k))
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmtr, "{}-{}-{}", self.from, self.action_label, self.to)
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SpecModel {
    pub states: Vec<StateName>,
    #[serde(default = "default_initial_state")]
    pub initial_state: StateName,
    #[serde(default)]
    pub final_states: Vec<StateName>,
    /// Typed declaration list for the specification's state variables.
    #[serde(default)]
    pub states_declaration: String,
    pub transitions: Vec<Transition>,
}

fn default_initial_state() -> StateName {
    START_STATE.to_string()
}

impl Default for SpecModel {
    fn default() -> Self {
        SpecModel {
            states: vec![default_initial_state()],
            initial_state: default_initial_state(),
            final_states: Vec::new(),
            states_declaration: String::new(),
            transitions: Vec::new(),
        }
    }
}

impl SpecModel {
    /// Deserialize from the persisted format and normalize. The returned
    /// model is read-only for the rest of the verification run.
    pub fn from_json(src: &str) -> Result<SpecModel> {
        let mut model: SpecModel = serde_json::from_str(src)?;
        model.prepare()?;
        Ok(model)
    }

    /// Validate callers and endpoints, and merge input-parameter participants
    /// into each transition's `new_participants`.
    pub fn prepare(&mut self) -> Result<()> {
        for t in &mut self.transitions {
            if t.caller.len() != 1 {
                return Err(DafsmError::MalformedCaller(t.id()));
            }
            if !self.states.iter().any(|s| s == &t.from) {
                return Err(DafsmError::UnknownState(t.from.clone()));
            }
            if !self.states.iter().any(|s| s == &t.to) {
                return Err(DafsmError::UnknownState(t.to.clone()));
            }
            let params = Declarations::parse_params(&t.input)?;
            for (name, role) in params.participants {
                t.new_participants.insert(name.clone(), vec![role.clone()]);
                t.participants_from_input.insert(name, vec![role]);
            }
        }
        Ok(())
    }

    pub fn declarations(&self) -> Result<Declarations> {
        Declarations::parse(&self.states_declaration)
    }

    pub fn is_final(&self, state: &str) -> bool {
        self.final_states.iter().any(|s| s == state)
    }
}
