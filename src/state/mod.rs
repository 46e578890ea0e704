//! Canonical orchestration state: typed model, schema table, dot-path access
//! and the on-disk store.

pub mod dotpath;
pub mod model;
pub mod schema;
pub mod store;

pub use dotpath::{get_value, set_value};
pub use model::{
    Actions, GateStatus, HealthSnapshot, HealthStatus, HistoryEntry, HistoryKind,
    MigrationRecord, OrchestrationState, PhaseState, PhaseStatus, Project, STATE_SCHEMA_VERSION,
    StepName, StepState, StepStatus,
};
pub use schema::{FieldSpec, FieldType, coerce_value_for_schema, lookup_field, validate};
pub use store::{StateLock, StateStore};
