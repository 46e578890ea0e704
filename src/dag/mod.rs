//! Task dependency graph.
//!
//! Builds a graph from the `depends on` / `after` / `requires` references in
//! tasks.md and reports cycles and dangling references.
//!
//! ```
//! use specflow::dag::DagBuilder;
//! use specflow::parsers::parse_tasks;
//!
//! let tasks = parse_tasks("- [ ] T001 a after T002\n- [ ] T002 b after T001\n");
//! let graph = DagBuilder::new(&tasks).build();
//! assert_eq!(graph.find_cycles().len(), 1);
//! ```

mod builder;

pub use builder::{Cycle, DagBuilder, TaskGraph, TaskIndex, UnknownDependency};
