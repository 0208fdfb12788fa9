// src/dag/graph.rs

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use crate::data::TaskId;
use crate::options::Traversal;

/// Dependency DAG over submitted tasks.
///
/// Vertices are submission indices, so every edge points from an older
/// submission to a younger one and the graph is acyclic by construction.
/// `add_edge` is idempotent; duplicate edges are elided.
#[derive(Debug, Default)]
pub struct TaskDag {
    graph: DiGraphMap<usize, ()>,
}

impl TaskDag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the next vertex; its id is the current vertex count.
    pub fn add_task(&mut self) -> TaskId {
        let id = self.graph.node_count();
        self.graph.add_node(id);
        TaskId(id)
    }

    pub fn add_edge(&mut self, from: TaskId, to: TaskId) {
        debug_assert!(from.0 < to.0, "edges go from older to younger submissions");
        self.graph.add_edge(from.0, to.0, ());
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains_edge(&self, from: TaskId, to: TaskId) -> bool {
        self.graph.contains_edge(from.0, to.0)
    }

    /// Direct predecessors, in edge insertion order.
    pub fn predecessors(&self, task: TaskId) -> Vec<TaskId> {
        self.graph
            .neighbors_directed(task.0, Direction::Incoming)
            .map(TaskId)
            .collect()
    }

    pub fn edges(&self) -> Vec<(TaskId, TaskId)> {
        self.graph
            .all_edges()
            .map(|(a, b, _)| (TaskId(a), TaskId(b)))
            .collect()
    }

    /// Directed reachability.
    pub fn has_path(&self, from: TaskId, to: TaskId) -> bool {
        petgraph::algo::has_path_connecting(&self.graph, from.0, to.0, None)
    }

    /// Vertices in the order selected by `traversal`. Every vertex is
    /// emitted exactly once, whatever the graph shape.
    pub fn traversal_order(&self, traversal: Traversal) -> Vec<TaskId> {
        match traversal {
            Traversal::Inorder => (0..self.task_count()).map(TaskId).collect(),
            Traversal::Bfs => self.bfs_order(),
            Traversal::Dfs => self.dfs_order(),
        }
    }

    /// Breadth-first along out-edges. A vertex discovered before all of
    /// its in-neighbours is deferred behind them, so the order is also a
    /// topological order and the placement walk never visits a task
    /// before its predecessors. The frontier reseeds from the next
    /// unvisited submission so disconnected components are fully covered.
    fn bfs_order(&self) -> Vec<TaskId> {
        let n = self.task_count();
        let mut emitted = vec![false; n];
        let mut order = Vec::with_capacity(n);
        let mut queue = std::collections::VecDeque::new();

        for seed in 0..n {
            if emitted[seed] {
                continue;
            }
            queue.push_back(seed);
            while let Some(v) = queue.pop_front() {
                if emitted[v] {
                    continue;
                }
                let blocked: Vec<usize> = self
                    .graph
                    .neighbors_directed(v, Direction::Incoming)
                    .filter(|&p| !emitted[p])
                    .collect();
                if blocked.is_empty() {
                    emitted[v] = true;
                    order.push(TaskId(v));
                    for next in self.graph.neighbors_directed(v, Direction::Outgoing) {
                        if !emitted[next] {
                            queue.push_back(next);
                        }
                    }
                } else {
                    // visit the missing in-neighbours first, then retry;
                    // in-neighbours have smaller ids, so this terminates
                    for p in blocked {
                        queue.push_back(p);
                    }
                    queue.push_back(v);
                }
            }
        }
        order
    }

    /// Iterative depth-first with backtracking: a vertex is emitted only
    /// once every in-neighbour is emitted; a blocked vertex is re-queued
    /// behind its missing in-neighbours. In-neighbours always carry
    /// smaller submission ids, so the walk terminates.
    fn dfs_order(&self) -> Vec<TaskId> {
        let n = self.task_count();
        let mut emitted = vec![false; n];
        let mut order = Vec::with_capacity(n);
        let mut stack: Vec<usize> = Vec::new();

        for seed in 0..n {
            if emitted[seed] {
                continue;
            }
            stack.push(seed);
            while let Some(v) = stack.pop() {
                if emitted[v] {
                    continue;
                }
                let blocked: Vec<usize> = self
                    .graph
                    .neighbors_directed(v, Direction::Incoming)
                    .filter(|&p| !emitted[p])
                    .collect();
                if blocked.is_empty() {
                    emitted[v] = true;
                    order.push(TaskId(v));
                    let mut outs: Vec<usize> = self
                        .graph
                        .neighbors_directed(v, Direction::Outgoing)
                        .collect();
                    // first recorded out-edge is visited first
                    outs.reverse();
                    stack.extend(outs);
                } else {
                    stack.push(v);
                    stack.extend(blocked);
                }
            }
        }
        order
    }
}
