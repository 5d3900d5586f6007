//! The state multigraph of a specification. Parallel transitions between the
//! same state pair are kept as distinct edges; a detailed path picks one
//! concrete transition per hop, so one node-level path expands into the
//! cartesian product of its parallel edges.

use dafsm_domain::*;
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Clone, Default)]
pub struct PathGraph {
    start: StateName,
    states: Vec<StateName>,
    transitions: Vec<Transition>,
    outgoing: FxHashMap<StateName, Vec<usize>>,
    successors: FxHashMap<StateName, Vec<StateName>>,
    by_pair: FxHashMap<(StateName, StateName), Vec<usize>>,
}

impl PathGraph {
    pub fn new(model: &SpecModel) -> PathGraph {
        let mut graph = PathGraph {
            start: model.initial_state.clone(),
            ..PathGraph::default()
        };
        for s in &model.states {
            graph.add_state(s);
        }
        for t in &model.transitions {
            graph.add_transition(t.clone());
        }
        graph
    }

    pub fn add_state(&mut self, state: &str) {
        if !self.states.iter().any(|s| s == state) {
            self.states.push(state.to_string());
        }
    }

    pub fn add_transition(&mut self, transition: Transition) {
        self.add_state(&transition.from);
        self.add_state(&transition.to);
        let idx = self.transitions.len();
        self.outgoing
            .entry(transition.from.clone())
            .or_default()
            .push(idx);
        let succs = self.successors.entry(transition.from.clone()).or_default();
        if !succs.iter().any(|s| s == &transition.to) {
            succs.push(transition.to.clone());
        }
        self.by_pair
            .entry((transition.from.clone(), transition.to.clone()))
            .or_default()
            .push(idx);
        self.transitions.push(transition);
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn states(&self) -> &[StateName] {
        &self.states
    }

    pub fn outgoing_transitions(&self, state: &str) -> Vec<&Transition> {
        self.outgoing
            .get(state)
            .map(|idxs| idxs.iter().map(|&i| &self.transitions[i]).collect())
            .unwrap_or_default()
    }

    /// Node-level simple paths from the start state to `target`, lazily.
    /// The sequence is restartable: every call yields a fresh traversal.
    pub fn simple_paths<'g>(&'g self, target: &str) -> SimplePaths<'g> {
        let mut paths = SimplePaths {
            graph: self,
            target: target.to_string(),
            stack: Vec::new(),
            path: Vec::new(),
            on_path: FxHashSet::default(),
        };
        if target != self.start && self.states.iter().any(|s| s == &self.start) {
            paths.stack.push((self.start.clone(), 0));
            paths.path.push(self.start.clone());
            paths.on_path.insert(self.start.clone());
        }
        paths
    }

    /// Detailed paths to `target`: each node-level simple path crossed with
    /// every combination of parallel transitions along its hops.
    pub fn detailed_paths<'g>(&'g self, target: &str) -> DetailedPaths<'g> {
        DetailedPaths {
            graph: self,
            inner: self.simple_paths(target),
            hops: Vec::new(),
            counters: Vec::new(),
            active: false,
        }
    }

    /// Number of node-level simple paths reaching `target`.
    pub fn count_paths(&self, target: &str) -> usize {
        self.simple_paths(target).count()
    }

    /// Render a detailed path as `S0-a1-S1>S1-a2-S2`.
    pub fn path_trace(path: &[&Transition]) -> String {
        let steps: Vec<_> = path.iter().map(|t| format!("{t}")).collect();
        steps.join(">")
    }
}

/// Explicit-stack depth-first enumeration of simple node paths; no state is
/// revisited within one path.
pub struct SimplePaths<'g> {
    graph: &'g PathGraph,
    target: StateName,
    stack: Vec<(StateName, usize)>,
    path: Vec<StateName>,
    on_path: FxHashSet<StateName>,
}

impl<'g> Iterator for SimplePaths<'g> {
    type Item = Vec<StateName>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.stack.is_empty() {
            let depth = self.stack.len() - 1;
            let (node, idx) = self.stack[depth].clone();
            let succs = self
                .graph
                .successors
                .get(&node)
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            if idx >= succs.len() {
                self.stack.pop();
                self.path.pop();
                self.on_path.remove(&node);
                continue;
            }
            self.stack[depth].1 += 1;
            let next = &succs[idx];
            if *next == self.target {
                let mut found = self.path.clone();
                found.push(next.clone());
                return Some(found);
            }
            if self.on_path.contains(next) {
                continue;
            }
            self.stack.push((next.clone(), 0));
            self.path.push(next.clone());
            self.on_path.insert(next.clone());
        }
        None
    }
}

/// Expands each simple path into the cartesian product of parallel
/// transitions per hop, odometer style.
pub struct DetailedPaths<'g> {
    graph: &'g PathGraph,
    inner: SimplePaths<'g>,
    hops: Vec<&'g [usize]>,
    counters: Vec<usize>,
    active: bool,
}

impl<'g> Iterator for DetailedPaths<'g> {
    type Item = Vec<&'g Transition>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.active {
                let nodes = self.inner.next()?;
                let mut hops: Vec<&'g [usize]> = Vec::with_capacity(nodes.len() - 1);
                for pair in nodes.windows(2) {
                    let ids = self
                        .graph
                        .by_pair
                        .get(&(pair[0].clone(), pair[1].clone()))
                        .map(|v| v.as_slice())
                        .unwrap_or(&[]);
                    hops.push(ids);
                }
                if hops.is_empty() || hops.iter().any(|h| h.is_empty()) {
                    continue;
                }
                self.hops = hops;
                self.counters = vec![0; self.hops.len()];
                self.active = true;
            }

            let detail: Vec<&'g Transition> = self
                .hops
                .iter()
                .zip(&self.counters)
                .map(|(ids, &c)| &self.graph.transitions[ids[c]])
                .collect();

            let mut pos = self.hops.len();
            loop {
                if pos == 0 {
                    self.active = false;
                    break;
                }
                pos -= 1;
                self.counters[pos] += 1;
                if self.counters[pos] < self.hops[pos].len() {
                    break;
                }
                self.counters[pos] = 0;
            }

            return Some(detail);
        }
    }
}
