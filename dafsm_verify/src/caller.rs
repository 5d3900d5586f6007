//! Caller-introduction analysis: a transition's caller must be provably a
//! participant, with the required roles, on every detailed path that can
//! reach the transition's source state.

use crate::{PathGraph, VerifyConfig};
use dafsm_domain::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::time::{Duration, Instant};
use tracing::warn;

/// Canonical memo key; role order never changes the answer.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
struct IntroKey {
    caller: String,
    roles: Vec<Role>,
    state: StateName,
}

pub struct CallerIntroductionChecker {
    graph: PathGraph,
    memo: FxHashMap<IntroKey, bool>,
    paths_visited: u64,
    timed_out: bool,
    timeout: Duration,
    started: Instant,
    log_enabled: bool,
}

impl CallerIntroductionChecker {
    pub fn new(model: &SpecModel, config: &VerifyConfig) -> CallerIntroductionChecker {
        CallerIntroductionChecker {
            graph: PathGraph::new(model),
            memo: FxHashMap::default(),
            paths_visited: 0,
            timed_out: false,
            timeout: config.timeout,
            started: Instant::now(),
            log_enabled: config.log_enabled,
        }
    }

    pub fn configure(&mut self, config: &VerifyConfig) {
        self.timeout = config.timeout;
        self.log_enabled = config.log_enabled;
    }

    pub fn graph(&self) -> &PathGraph {
        &self.graph
    }

    /// Paths visited by the most recent query.
    pub fn paths_visited(&self) -> u64 {
        self.paths_visited
    }

    /// Sticky: once the budget is blown the checker stays timed out and every
    /// further traversal fails closed.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn is_caller_introduced(&mut self, transition: &Transition) -> Result<bool> {
        self.started = Instant::now();
        self.paths_visited = 1;
        let (caller, required) = transition.caller()?;

        // introduced by this very transition
        if required.is_empty() && transition.new_participants.contains_key(caller) {
            return Ok(true);
        }
        if !transition.new_participants.is_empty()
            && transition
                .new_participants
                .values()
                .any(|roles| required.iter().all(|r| roles.contains(r)))
        {
            return Ok(true);
        }

        let mut roles = required.to_vec();
        roles.sort();
        let key = IntroKey {
            caller: caller.to_string(),
            roles,
            state: transition.from.clone(),
        };
        if let Some(&cached) = self.memo.get(&key) {
            return Ok(cached);
        }

        let result = self.all_paths_introduce(&transition.from, caller, required);
        self.memo.insert(key, result);
        Ok(result)
    }

    /// True when every detailed path from the start state to `target`
    /// introduces the caller. Fails fast on the first path that does not,
    /// and fails closed when the time budget is exceeded. The budget is
    /// polled once per completed path.
    fn all_paths_introduce(&mut self, target: &str, caller: &str, required: &[Role]) -> bool {
        for path in self.graph.detailed_paths(target) {
            self.paths_visited += 1;
            if !self.timeout.is_zero()
                && (self.started.elapsed() > self.timeout || self.timed_out)
            {
                self.timed_out = true;
                return false;
            }
            if !path_introduces(&path, caller, required) {
                if self.log_enabled {
                    warn!(
                        "path {} does not introduce participant {caller} : {required:?}",
                        PathGraph::path_trace(&path),
                    );
                }
                return false;
            }
        }
        true
    }
}

/// Walk one detailed path accumulating the roles known per participant; the
/// target caller is introduced once its required roles are covered. A step
/// whose own caller-role requirement is already met by the roles seen so far
/// earns that caller an introduction with those roles.
fn path_introduces(path: &[&Transition], caller: &str, required: &[Role]) -> bool {
    let mut introduced: FxHashMap<String, FxHashSet<Role>> = FxHashMap::default();
    let mut path_roles: FxHashSet<Role> = FxHashSet::default();
    for step in path {
        for (p, roles) in &step.new_participants {
            let entry = introduced.entry(p.clone()).or_default();
            for r in roles {
                entry.insert(r.clone());
                path_roles.insert(r.clone());
            }
        }

        if let Ok((step_caller, step_roles)) = step.caller() {
            if step.new_participants.is_empty()
                && !step_roles.is_empty()
                && step_roles.iter().all(|r| path_roles.contains(r))
            {
                let entry = introduced.entry(step_caller.to_string()).or_default();
                for r in step_roles {
                    entry.insert(r.clone());
                    path_roles.insert(r.clone());
                }
            }
        }

        if required.is_empty() && introduced.contains_key(caller) {
            return true;
        }
        if !required.is_empty() {
            if let Some(roles) = introduced.get(caller) {
                if required.iter().all(|r| roles.contains(r)) {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod caller_tests {
    use super::*;
    use crate::VerifyConfig;

    fn deploy_model() -> SpecModel {
        // _ --deploy(p1:R1)--> S0 --a1(caller p1:R1)--> S1
        let mut model = SpecModel {
            states: vec!["_".into(), "S0".into(), "S1".into()],
            final_states: vec!["S1".into()],
            transitions: vec![
                Transition::new("_", "S0", "deploy")
                    .called_by("p1", &[])
                    .introducing("p1", &["R1"]),
                Transition::new("S0", "S1", "a1").called_by("p1", &["R1"]),
            ],
            ..SpecModel::default()
        };
        model.prepare().unwrap();
        model
    }

    #[test]
    fn end_to_end_single_path_introduction() {
        let model = deploy_model();
        let mut checker = CallerIntroductionChecker::new(&model, &VerifyConfig::default());

        // the deploy transition introduces its own caller: no traversal
        let deploy = model.transitions[0].clone();
        assert!(checker.is_caller_introduced(&deploy).unwrap());
        assert_eq!(checker.paths_visited(), 1);

        // a1 is proven through the single path, which introduces p1 with R1
        let a1 = model.transitions[1].clone();
        assert!(checker.is_caller_introduced(&a1).unwrap());
        assert_eq!(checker.paths_visited(), 2);
        assert!(!checker.timed_out());
    }

    #[test]
    fn missing_role_fails_the_path() {
        let mut model = deploy_model();
        model.transitions[1] = Transition::new("S0", "S1", "a1").called_by("p1", &["R2"]);
        model.prepare().unwrap();
        let mut checker = CallerIntroductionChecker::new(&model, &VerifyConfig::default().with_log(false));
        let a1 = model.transitions[1].clone();
        assert!(!checker.is_caller_introduced(&a1).unwrap());
    }

    #[test]
    fn memoization_skips_traversal_on_identical_keys() {
        let model = deploy_model();
        let mut checker = CallerIntroductionChecker::new(&model, &VerifyConfig::default());
        let a1 = model.transitions[1].clone();
        assert!(checker.is_caller_introduced(&a1).unwrap());
        assert_eq!(checker.paths_visited(), 2);

        // same (caller, roles, state) key: cached, zero paths walked
        assert!(checker.is_caller_introduced(&a1).unwrap());
        assert_eq!(checker.paths_visited(), 1);

        // role order does not change the key
        let reordered = Transition::new("S0", "S1", "a1").called_by("p1", &["R1"]);
        assert!(checker.is_caller_introduced(&reordered).unwrap());
        assert_eq!(checker.paths_visited(), 1);
    }

    #[test]
    fn timeout_fails_closed() {
        // layered parallel edges make path expansion combinatorial
        let mut transitions = vec![Transition::new("_", "L0", "seed")
            .called_by("p1", &[])
            .introducing("p1", &["R1"])];
        let mut states: Vec<StateName> = vec!["_".into(), "L0".into()];
        for i in 0..10 {
            let from = format!("L{i}");
            let to = format!("L{}", i + 1);
            states.push(to.clone());
            for j in 0..3 {
                transitions.push(Transition::new(&from, &to, &format!("hop{i}_{j}")).called_by("p1", &[]));
            }
        }
        let mut model = SpecModel {
            states,
            transitions,
            ..SpecModel::default()
        };
        model.prepare().unwrap();

        let config = VerifyConfig::default()
            .with_timeout(Duration::from_nanos(1))
            .with_log(false);
        let mut checker = CallerIntroductionChecker::new(&model, &config);
        // a caller that is never introduced forces the full walk
        let probe = Transition::new("L10", "L10", "probe").called_by("ghost", &["R9"]);
        assert!(!checker.is_caller_introduced(&probe).unwrap());
        assert!(checker.timed_out());
    }

    #[test]
    fn roles_earned_through_participation_count() {
        // deploy introduces p1:R1; step2 is called by p2 requiring R1, which
        // the path roles already cover, so p2 is treated as introduced; step3
        // then requires p2:R1
        let mut model = SpecModel {
            states: vec!["_".into(), "S0".into(), "S1".into(), "S2".into()],
            transitions: vec![
                Transition::new("_", "S0", "deploy")
                    .called_by("p1", &[])
                    .introducing("p1", &["R1"]),
                Transition::new("S0", "S1", "join").called_by("p2", &["R1"]),
                Transition::new("S1", "S2", "act").called_by("p2", &["R1"]),
            ],
            ..SpecModel::default()
        };
        model.prepare().unwrap();
        let mut checker = CallerIntroductionChecker::new(&model, &VerifyConfig::default().with_log(false));
        let act = model.transitions[2].clone();
        assert!(checker.is_caller_introduced(&act).unwrap());
    }

    #[test]
    fn role_accumulation_is_monotone() {
        let model = deploy_model();
        let graph = PathGraph::new(&model);
        for path in graph.detailed_paths("S1") {
            let mut seen: FxHashSet<Role> = FxHashSet::default();
            let mut previous = 0usize;
            for step in &path {
                for roles in step.new_participants.values() {
                    for r in roles {
                        seen.insert(r.clone());
                    }
                }
                assert!(seen.len() >= previous);
                previous = seen.len();
            }
        }
    }
}
