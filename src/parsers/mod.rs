//! Lenient parsers for the hand-edited markdown artifacts.
//!
//! Every parser ignores lines it does not recognize; these files are edited
//! by people and carry arbitrary prose between the structured parts.

pub mod checklist;
pub mod roadmap;
pub mod tasks;

pub use checklist::{
    CHECKLISTS_DIR, Checklist, ChecklistItem, ChecklistKind, ChecklistSection, ChecklistStatus,
    parse_checklist, read_checklist, read_checklists,
};
pub use roadmap::{RoadmapPhase, find_phase, parse_roadmap, read_roadmap};
pub use tasks::{Task, TaskProgress, TaskStatus, parse_tasks, read_tasks};
