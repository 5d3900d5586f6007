//! Well-formedness verification for DAFSM specifications: reachability
//! analysis with caller-role propagation, non-determinism witnesses and
//! action-consistency conditions, evaluated against a pluggable solver.

pub mod graph;
pub use graph::*;

pub mod caller;
pub use caller::*;

pub mod determinism;
pub use determinism::*;

pub mod consistency;
pub use consistency::*;

pub mod solver;
pub use solver::*;

pub mod checker;
pub use checker::*;

pub mod batch;
pub use batch::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Options recognized by a verification run.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Keep checking after a transition fails instead of aborting the run.
    pub non_stop: bool,
    /// Budget for caller-introduction path exploration; zero is unbounded.
    pub timeout: Duration,
    /// Verbose path-trace reporting on failures.
    pub log_enabled: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        VerifyConfig {
            non_stop: true,
            timeout: Duration::ZERO,
            log_enabled: true,
        }
    }
}

impl VerifyConfig {
    pub fn with_non_stop(mut self, non_stop: bool) -> Self {
        self.non_stop = non_stop;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_log(mut self, log_enabled: bool) -> Self {
        self.log_enabled = log_enabled;
        self
    }
}

/// Read-only statistics for one verification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub run_id: Uuid,
    pub participants_time: Duration,
    pub non_determinism_time: Duration,
    pub consistency_time: Duration,
    pub building_time: Duration,
    pub paths_visited: u64,
    pub timed_out: bool,
}

impl RunStats {
    pub fn new() -> RunStats {
        RunStats {
            run_id: Uuid::new_v4(),
            participants_time: Duration::ZERO,
            non_determinism_time: Duration::ZERO,
            consistency_time: Duration::ZERO,
            building_time: Duration::ZERO,
            paths_visited: 0,
            timed_out: false,
        }
    }
}

impl Default for RunStats {
    fn default() -> Self {
        RunStats::new()
    }
}

/// Which of the three per-transition checks a result belongs to.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum CheckKind {
    Participants,
    NonDeterminism,
    Consistency,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckKind::Participants => write!(fmtr, "participants"),
            CheckKind::NonDeterminism => write!(fmtr, "non-determinism"),
            CheckKind::Consistency => write!(fmtr, "action-consistency"),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Failure {
    /// Identifier of the offending transition, `from_label_to`.
    pub transition: String,
    pub kind: CheckKind,
    pub diagnostic: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmtr, "[{}] {}: {}", self.kind, self.transition, self.diagnostic)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum Verdict {
    WellFormed,
    NotWellFormed { failures: Vec<Failure> },
}

impl Verdict {
    pub fn is_well_formed(&self) -> bool {
        matches!(self, Verdict::WellFormed)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::WellFormed => write!(fmtr, "(!) Verdict: Well Formed"),
            Verdict::NotWellFormed { failures } => {
                write!(fmtr, "(!) Verdict: Non Well Formed ({} failures)", failures.len())
            }
        }
    }
}

#[cfg(test)]
mod reporting_tests {
    use super::*;

    #[test]
    fn run_stats_serialize_for_telemetry() {
        let stats = RunStats::new();
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("run_id").is_some());
        assert!(json.get("paths_visited").is_some());
        assert_eq!(json["timed_out"], serde_json::json!(false));
    }

    #[test]
    fn verdict_round_trips() {
        let verdict = Verdict::NotWellFormed {
            failures: vec![Failure {
                transition: "S0_a1_S1".to_string(),
                kind: CheckKind::NonDeterminism,
                diagnostic: "two competing transitions can be enabled at once".to_string(),
            }],
        };
        let json = serde_json::to_string(&verdict).unwrap();
        let back: Verdict = serde_json::from_str(&json).unwrap();
        assert_eq!(verdict, back);
        assert!(!back.is_well_formed());
    }

    #[test]
    fn config_setters_compose() {
        let config = VerifyConfig::default()
            .with_non_stop(false)
            .with_timeout(Duration::from_secs(5))
            .with_log(false);
        assert!(!config.non_stop);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(!config.log_enabled);
    }
}
