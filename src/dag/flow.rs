//! FlowGraph - dependency graph of one DAG's tasks
//!
//! Edges come from every task's upstream set: producers named in its
//! input bindings plus explicit `dependentTasks`.
//!
//! - Arc<str> ids shared with the orchestrator and events
//! - FxHashMap adjacency, SmallVec dependency lists (most tasks have ≤4)
//! - DFS three-color cycle detection
//! - Kahn topological order with name tie-break

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::ast::DagSpec;
use crate::error::KilnError;

/// Stack-allocated deps: most tasks have 0-4 dependencies
pub type DepVec = SmallVec<[Arc<str>; 4]>;

/// Immutable dependency graph of a DagSpec
#[derive(Debug, Clone)]
pub struct FlowGraph {
    /// task -> successors
    adjacency: FxHashMap<Arc<str>, DepVec>,
    /// task -> predecessors
    predecessors: FxHashMap<Arc<str>, DepVec>,
    /// All task ids, sorted by name
    task_ids: Vec<Arc<str>>,
}

impl FlowGraph {
    /// Build the graph; an upstream name that is not a sibling is an error
    pub fn from_dag(dag: &DagSpec) -> Result<Self, KilnError> {
        let capacity = dag.tasks.len();
        let mut adjacency: FxHashMap<Arc<str>, DepVec> =
            FxHashMap::with_capacity_and_hasher(capacity, Default::default());
        let mut predecessors: FxHashMap<Arc<str>, DepVec> =
            FxHashMap::with_capacity_and_hasher(capacity, Default::default());
        let mut task_ids: Vec<Arc<str>> = Vec::with_capacity(capacity);
        let mut ids: FxHashMap<&str, Arc<str>> =
            FxHashMap::with_capacity_and_hasher(capacity, Default::default());

        // BTreeMap iteration: ids come out sorted
        for name in dag.tasks.keys() {
            let id: Arc<str> = Arc::from(name.as_str());
            task_ids.push(Arc::clone(&id));
            adjacency.insert(Arc::clone(&id), DepVec::new());
            predecessors.insert(Arc::clone(&id), DepVec::new());
            ids.insert(name.as_str(), id);
        }

        for (name, task) in &dag.tasks {
            let target = Arc::clone(&ids[name.as_str()]);
            for upstream in task.upstream_tasks() {
                let source = ids
                    .get(upstream)
                    .cloned()
                    .ok_or_else(|| KilnError::MissingDependency {
                        task: name.clone(),
                        dep: upstream.to_string(),
                    })?;
                adjacency
                    .entry(Arc::clone(&source))
                    .or_default()
                    .push(Arc::clone(&target));
                predecessors.entry(Arc::clone(&target)).or_default().push(source);
            }
        }

        Ok(Self {
            adjacency,
            predecessors,
            task_ids,
        })
    }

    pub fn len(&self) -> usize {
        self.task_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_ids.is_empty()
    }

    /// All task ids in name order
    pub fn task_ids(&self) -> &[Arc<str>] {
        &self.task_ids
    }

    #[inline]
    pub fn contains(&self, task_id: &str) -> bool {
        self.predecessors.contains_key(task_id)
    }

    #[inline]
    pub fn get_dependencies(&self, task_id: &str) -> &[Arc<str>] {
        static EMPTY: &[Arc<str>] = &[];
        self.predecessors
            .get(task_id)
            .map_or(EMPTY, SmallVec::as_slice)
    }

    #[inline]
    pub fn get_successors(&self, task_id: &str) -> &[Arc<str>] {
        static EMPTY: &[Arc<str>] = &[];
        self.adjacency
            .get(task_id)
            .map_or(EMPTY, SmallVec::as_slice)
    }

    /// Deterministic topological order (Kahn; ready ties broken by name)
    ///
    /// Fails with `CycleDetected` naming the cycle.
    pub fn topological_order(&self) -> Result<Vec<Arc<str>>, KilnError> {
        let mut in_degree: FxHashMap<&str, usize> =
            FxHashMap::with_capacity_and_hasher(self.task_ids.len(), Default::default());
        let mut ready: BinaryHeap<Reverse<&Arc<str>>> = BinaryHeap::new();
        for id in &self.task_ids {
            let degree = self.get_dependencies(id).len();
            if degree == 0 {
                ready.push(Reverse(id));
            }
            in_degree.insert(&**id, degree);
        }

        let mut order = Vec::with_capacity(self.task_ids.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(Arc::clone(id));
            for next in self.get_successors(id) {
                let key: &str = next;
                if let Some(degree) = in_degree.get_mut(key) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(next));
                    }
                }
            }
        }

        if order.len() != self.task_ids.len() {
            self.detect_cycles()?;
            // Unreachable when in-degrees are consistent; report the stuck set
            let stuck: Vec<&str> = self
                .task_ids
                .iter()
                .filter(|id| !order.contains(*id))
                .map(|id| &**id)
                .collect();
            return Err(KilnError::CycleDetected {
                cycle: stuck.join(" → "),
            });
        }
        Ok(order)
    }

    /// Detect cycles using DFS with three-color marking
    ///
    /// - White: unvisited
    /// - Gray: on the current DFS path
    /// - Black: fully processed
    ///
    /// Reaching a Gray node closes a cycle.
    pub fn detect_cycles(&self) -> Result<(), KilnError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn dfs(
            node: &Arc<str>,
            adjacency: &FxHashMap<Arc<str>, DepVec>,
            colors: &mut FxHashMap<Arc<str>, Color>,
            stack: &mut Vec<Arc<str>>,
        ) -> Result<(), String> {
            colors.insert(Arc::clone(node), Color::Gray);
            stack.push(Arc::clone(node));

            if let Some(neighbors) = adjacency.get(node) {
                for neighbor in neighbors {
                    match colors.get(neighbor) {
                        Some(Color::Gray) => {
                            let start = stack
                                .iter()
                                .position(|x| x == neighbor)
                                .unwrap_or(0);
                            let cycle: Vec<&str> =
                                stack[start..].iter().map(|s| s.as_ref()).collect();
                            return Err(format!("{} → {}", cycle.join(" → "), neighbor));
                        }
                        Some(Color::White) | None => dfs(neighbor, adjacency, colors, stack)?,
                        Some(Color::Black) => {}
                    }
                }
            }

            stack.pop();
            colors.insert(Arc::clone(node), Color::Black);
            Ok(())
        }

        let mut colors: FxHashMap<Arc<str>, Color> = self
            .task_ids
            .iter()
            .map(|id| (Arc::clone(id), Color::White))
            .collect();
        let mut stack: Vec<Arc<str>> = Vec::new();

        for task_id in &self.task_ids {
            if colors.get(task_id) == Some(&Color::White) {
                dfs(task_id, &self.adjacency, &mut colors, &mut stack)
                    .map_err(|cycle| KilnError::CycleDetected { cycle })?;
            }
        }
        Ok(())
    }
}
