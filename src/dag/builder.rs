//! Task dependency graph construction and cycle detection.
//!
//! Edges run from a task to each task it depends on. Unlike a scheduling
//! DAG this graph is built from hand-edited text, so it is allowed to
//! contain cycles and dangling references; both are reported rather than
//! rejected.

use std::collections::HashMap;

use serde::Serialize;

use crate::parsers::{Task, TaskStatus};

/// Index into the task list.
pub type TaskIndex = usize;

/// A dependency naming a task id that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownDependency {
    pub task: String,
    pub missing: String,
}

/// One dependency cycle, listed in traversal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cycle {
    pub task_ids: Vec<String>,
}

impl Cycle {
    /// `T001 -> T002 -> T001` style rendering.
    pub fn describe(&self) -> String {
        let mut parts = self.task_ids.clone();
        if let Some(first) = self.task_ids.first() {
            parts.push(first.clone());
        }
        parts.join(" -> ")
    }
}

/// Directed graph over parsed tasks.
#[derive(Debug)]
pub struct TaskGraph {
    ids: Vec<String>,
    statuses: Vec<TaskStatus>,
    index_map: HashMap<String, TaskIndex>,
    /// index -> tasks it depends on
    dependencies: Vec<Vec<TaskIndex>>,
    /// index -> tasks that depend on it
    dependents: Vec<Vec<TaskIndex>>,
    unknown: Vec<UnknownDependency>,
    duplicates: Vec<String>,
}

impl TaskGraph {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get_index(&self, id: &str) -> Option<TaskIndex> {
        self.index_map.get(id).copied()
    }

    pub fn id(&self, index: TaskIndex) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }

    pub fn dependencies(&self, index: TaskIndex) -> &[TaskIndex] {
        self.dependencies.get(index).map_or(&[], |v| v.as_slice())
    }

    pub fn dependents(&self, index: TaskIndex) -> &[TaskIndex] {
        self.dependents.get(index).map_or(&[], |v| v.as_slice())
    }

    pub fn unknown_dependencies(&self) -> &[UnknownDependency] {
        &self.unknown
    }

    /// Ids that appeared more than once; only the first occurrence is a node.
    pub fn duplicate_ids(&self) -> &[String] {
        &self.duplicates
    }

    /// Open tasks whose dependencies are all done or deferred.
    pub fn ready_tasks(&self) -> Vec<&str> {
        (0..self.len())
            .filter(|&i| matches!(self.statuses[i], TaskStatus::Todo))
            .filter(|&i| {
                self.dependencies(i)
                    .iter()
                    .all(|&d| matches!(self.statuses[d], TaskStatus::Done | TaskStatus::Deferred))
            })
            .map(|i| self.ids[i].as_str())
            .collect()
    }

    /// Find every dependency cycle in one pass.
    ///
    /// Depth-first traversal with an explicit stack. Reaching a node that is
    /// still on the current path records the path slice from that node to
    /// the current one as a cycle. Every unvisited node is used as a new
    /// root, so independent cycles are all found.
    pub fn find_cycles(&self) -> Vec<Cycle> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnPath,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.len()];
        let mut cycles = Vec::new();

        for root in 0..self.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            // (node, next dependency to visit)
            let mut stack: Vec<(TaskIndex, usize)> = vec![(root, 0)];
            let mut path: Vec<TaskIndex> = vec![root];
            marks[root] = Mark::OnPath;

            while let Some(frame) = stack.last_mut() {
                let (node, cursor) = *frame;
                let Some(&next) = self.dependencies(node).get(cursor) else {
                    marks[node] = Mark::Done;
                    stack.pop();
                    path.pop();
                    continue;
                };
                frame.1 += 1;

                match marks[next] {
                    Mark::OnPath => {
                        if let Some(start) = path.iter().position(|&n| n == next) {
                            cycles.push(Cycle {
                                task_ids: path[start..]
                                    .iter()
                                    .map(|&i| self.ids[i].clone())
                                    .collect(),
                            });
                        }
                    }
                    Mark::Unvisited => {
                        marks[next] = Mark::OnPath;
                        stack.push((next, 0));
                        path.push(next);
                    }
                    Mark::Done => {}
                }
            }
        }
        cycles
    }
}

/// Builds a [`TaskGraph`] from parsed tasks.
pub struct DagBuilder<'a> {
    tasks: &'a [Task],
}

impl<'a> DagBuilder<'a> {
    pub fn new(tasks: &'a [Task]) -> Self {
        Self { tasks }
    }

    pub fn build(self) -> TaskGraph {
        let mut ids = Vec::new();
        let mut statuses = Vec::new();
        let mut index_map = HashMap::new();
        let mut duplicates = Vec::new();
        let mut sources: Vec<&Task> = Vec::new();

        for task in self.tasks {
            if index_map.contains_key(&task.id) {
                duplicates.push(task.id.clone());
                continue;
            }
            index_map.insert(task.id.clone(), ids.len());
            ids.push(task.id.clone());
            statuses.push(task.status);
            sources.push(task);
        }

        let mut dependencies: Vec<Vec<TaskIndex>> = vec![Vec::new(); ids.len()];
        let mut dependents: Vec<Vec<TaskIndex>> = vec![Vec::new(); ids.len()];
        let mut unknown = Vec::new();

        for (from, task) in sources.iter().enumerate() {
            for dep in &task.dependencies {
                match index_map.get(dep) {
                    Some(&to) => {
                        dependencies[from].push(to);
                        dependents[to].push(from);
                    }
                    None => unknown.push(UnknownDependency {
                        task: task.id.clone(),
                        missing: dep.clone(),
                    }),
                }
            }
        }

        TaskGraph {
            ids,
            statuses,
            index_map,
            dependencies,
            dependents,
            unknown,
            duplicates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::parse_tasks;

    fn task(id: &str, deps: &[&str]) -> Task {
        task_with_status(id, deps, TaskStatus::Todo)
    }

    fn task_with_status(id: &str, deps: &[&str], status: TaskStatus) -> Task {
        Task {
            id: id.to_string(),
            description: format!("Task {}", id),
            status,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            section: None,
            user_story: None,
            parallel: false,
            verification: false,
            blocked_reason: None,
            line: 0,
        }
    }

    #[test]
    fn test_three_cycle_reported_once() {
        let tasks = vec![
            task("T001", &["T002"]),
            task("T002", &["T003"]),
            task("T003", &["T001"]),
        ];
        let graph = DagBuilder::new(&tasks).build();
        let cycles = graph.find_cycles();
        assert_eq!(cycles.len(), 1);
        let mut ids = cycles[0].task_ids.clone();
        ids.sort();
        assert_eq!(ids, ["T001", "T002", "T003"]);
        assert_eq!(cycles[0].describe(), "T001 -> T002 -> T003 -> T001");
    }

    #[test]
    fn test_independent_cycles_all_reported() {
        let tasks = vec![
            task("T001", &["T002"]),
            task("T002", &["T001"]),
            task("T003", &[]),
            task("T004", &["T005"]),
            task("T005", &["T004"]),
        ];
        let cycles = DagBuilder::new(&tasks).build().find_cycles();
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0].task_ids, ["T001", "T002"]);
        assert_eq!(cycles[1].task_ids, ["T004", "T005"]);
    }

    #[test]
    fn test_acyclic_graph_and_edges() {
        let tasks = vec![
            task("T001", &[]),
            task("T002", &["T001"]),
            task("T003", &["T001", "T002"]),
        ];
        let graph = DagBuilder::new(&tasks).build();
        assert!(graph.find_cycles().is_empty());
        assert_eq!(graph.dependencies(2), &[0, 1]);
        assert_eq!(graph.dependents(0), &[1, 2]);
        assert_eq!(graph.id(1), Some("T002"));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let tasks = vec![task("T001", &["T001"])];
        let cycles = DagBuilder::new(&tasks).build().find_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].task_ids, ["T001"]);
    }

    #[test]
    fn test_unknown_and_duplicate_ids_reported() {
        let tasks = vec![
            task("T001", &["T999"]),
            task("T001", &[]),
            task("T002", &["T001"]),
        ];
        let graph = DagBuilder::new(&tasks).build();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.duplicate_ids(), ["T001"]);
        assert_eq!(
            graph.unknown_dependencies(),
            [UnknownDependency {
                task: "T001".into(),
                missing: "T999".into()
            }]
        );
    }

    #[test]
    fn test_ready_tasks_require_finished_dependencies() {
        let tasks = vec![
            task_with_status("T001", &[], TaskStatus::Done),
            task("T002", &["T001"]),
            task("T003", &["T002"]),
            task_with_status("T004", &[], TaskStatus::Blocked),
        ];
        let graph = DagBuilder::new(&tasks).build();
        assert_eq!(graph.ready_tasks(), ["T002"]);
    }

    #[test]
    fn test_graph_from_parsed_text() {
        let tasks = parse_tasks(
            "- [ ] T001 a, depends on T003\n- [ ] T002 b after T001\n- [ ] T003 c requires T002\n",
        );
        let cycles = DagBuilder::new(&tasks).build().find_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].task_ids.len(), 3);
    }
}
