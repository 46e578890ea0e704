//! Per-field type table for the state document.
//!
//! Validation and command-line coercion both walk this table instead of
//! reflecting over the serde model, so the expected type of any dot-path is
//! plain data. A `*` segment stands for any key of an object or any index
//! of an array.

use chrono::DateTime;
use serde_json::Value;

use super::model::{GateStatus, HealthStatus, HistoryKind, PhaseStatus, StepName, StepStatus};
use crate::errors::SchemaViolation;

/// Primitive type expected at a dot-path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    /// Fixed-width numeric string ("0010")
    PhaseNumber,
    Integer { min: i64, max: i64 },
    Boolean,
    Timestamp,
    Enum(&'static [&'static str]),
    Object,
    Array,
}

/// One entry of the type table.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub path: &'static str,
    pub ty: FieldType,
    pub nullable: bool,
    pub required: bool,
}

const fn field(path: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        path,
        ty,
        nullable: false,
        required: false,
    }
}

const fn required(path: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        path,
        ty,
        nullable: false,
        required: true,
    }
}

const fn nullable(path: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        path,
        ty,
        nullable: true,
        required: false,
    }
}

/// The state document schema, parents before children.
pub static FIELDS: &[FieldSpec] = &[
    required("schema_version", FieldType::String),
    required("project", FieldType::Object),
    required("project.id", FieldType::String),
    required("project.name", FieldType::String),
    field("project.path", FieldType::String),
    required("last_updated", FieldType::Timestamp),
    field("phase", FieldType::Object),
    nullable("phase.number", FieldType::PhaseNumber),
    nullable("phase.name", FieldType::String),
    nullable("phase.branch", FieldType::String),
    field("phase.status", FieldType::Enum(PhaseStatus::VALUES)),
    field("phase.has_user_gate", FieldType::Boolean),
    field("step", FieldType::Object),
    nullable("step.current", FieldType::Enum(StepName::VALUES)),
    field("step.index", FieldType::Integer { min: 0, max: 3 }),
    field("step.status", FieldType::Enum(StepStatus::VALUES)),
    field("actions", FieldType::Object),
    field("actions.history", FieldType::Array),
    field("actions.history.*", FieldType::Object),
    required("actions.history.*.type", FieldType::Enum(HistoryKind::VALUES)),
    required("actions.history.*.phase_number", FieldType::String),
    required("actions.history.*.phase_name", FieldType::String),
    nullable("actions.history.*.branch", FieldType::String),
    required("actions.history.*.completed_at", FieldType::Timestamp),
    field("health", FieldType::Object),
    field("health.status", FieldType::Enum(HealthStatus::VALUES)),
    nullable("health.last_check", FieldType::Timestamp),
    field(
        "health.issue_count",
        FieldType::Integer {
            min: 0,
            max: u32::MAX as i64,
        },
    ),
    field("gates", FieldType::Object),
    field("gates.*", FieldType::Enum(GateStatus::VALUES)),
    field("migrations", FieldType::Array),
    field("migrations.*", FieldType::Object),
    required("migrations.*.from", FieldType::String),
    required("migrations.*.to", FieldType::String),
    required("migrations.*.date", FieldType::Timestamp),
];

fn segments_match(pattern: &str, path: &str) -> bool {
    let mut pattern_parts = pattern.split('.');
    let mut path_parts = path.split('.');
    loop {
        match (pattern_parts.next(), path_parts.next()) {
            (None, None) => return true,
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            _ => return false,
        }
    }
}

/// Find the table entry governing `path`, if any.
pub fn lookup_field(path: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|spec| segments_match(spec.path, path))
}

fn type_error(ty: FieldType, value: &Value) -> Option<String> {
    let ok = match ty {
        FieldType::String => value.is_string(),
        FieldType::PhaseNumber => {
            return match value.as_str() {
                Some(s) if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) => None,
                Some(s) => Some(format!("expected 4-digit phase number, got '{}'", s)),
                None => Some(format!("expected string, got {}", kind(value))),
            };
        }
        FieldType::Integer { min, max } => {
            return match value.as_i64() {
                Some(n) if n >= min && n <= max => None,
                Some(n) => Some(format!("value {} out of range {}..={}", n, min, max)),
                None => Some(format!("expected integer, got {}", kind(value))),
            };
        }
        FieldType::Boolean => value.is_boolean(),
        FieldType::Timestamp => {
            return match value.as_str() {
                Some(s) if DateTime::parse_from_rfc3339(s).is_ok() => None,
                Some(s) => Some(format!("expected RFC 3339 timestamp, got '{}'", s)),
                None => Some(format!("expected timestamp string, got {}", kind(value))),
            };
        }
        FieldType::Enum(values) => {
            return match value.as_str() {
                Some(s) if values.contains(&s) => None,
                Some(s) => Some(format!(
                    "unknown value '{}' (expected one of: {})",
                    s,
                    values.join(", ")
                )),
                None => Some(format!("expected string, got {}", kind(value))),
            };
        }
        FieldType::Object => value.is_object(),
        FieldType::Array => value.is_array(),
    };
    if ok {
        None
    } else {
        Some(format!("expected {}, got {}", describe(ty), kind(value)))
    }
}

fn describe(ty: FieldType) -> &'static str {
    match ty {
        FieldType::String | FieldType::PhaseNumber | FieldType::Timestamp | FieldType::Enum(_) => {
            "string"
        }
        FieldType::Integer { .. } => "integer",
        FieldType::Boolean => "boolean",
        FieldType::Object => "object",
        FieldType::Array => "array",
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check(spec: &FieldSpec, path: &str, value: &Value, out: &mut Vec<SchemaViolation>) {
    if value.is_null() {
        if !spec.nullable {
            out.push(SchemaViolation::new(path, "must not be null"));
        }
        return;
    }
    if let Some(reason) = type_error(spec.ty, value) {
        out.push(SchemaViolation::new(path, reason));
    }
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn children(node: &Value) -> Vec<(String, &Value)> {
    match node {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}

/// Every concrete node matching `pattern`, with its concrete dot-path.
fn resolve<'a>(doc: &'a Value, pattern: &str) -> Vec<(String, &'a Value)> {
    let mut nodes = vec![(String::new(), doc)];
    for segment in pattern.split('.') {
        nodes = nodes
            .into_iter()
            .flat_map(|(path, node)| {
                children(node)
                    .into_iter()
                    .filter(|(key, _)| segment == "*" || key == segment)
                    .map(move |(key, child)| (join(&path, &key), child))
                    .collect::<Vec<_>>()
            })
            .collect();
    }
    nodes
}

/// Validate a raw state document against the type table.
///
/// Returns every violation found; an empty list means the document has the
/// expected shape.
pub fn validate(doc: &Value) -> Vec<SchemaViolation> {
    let mut violations = Vec::new();
    if !doc.is_object() {
        violations.push(SchemaViolation::new("", "document root must be an object"));
        return violations;
    }

    for spec in FIELDS {
        let (parents, leaf) = match spec.path.rsplit_once('.') {
            Some((parent, leaf)) => (resolve(doc, parent), leaf),
            None => (vec![(String::new(), doc)], spec.path),
        };

        for (parent_path, parent) in parents {
            if leaf == "*" {
                for (key, value) in children(parent) {
                    check(spec, &join(&parent_path, &key), value, &mut violations);
                }
                continue;
            }
            let Value::Object(map) = parent else {
                continue;
            };
            let path = join(&parent_path, leaf);
            match map.get(leaf) {
                Some(value) => check(spec, &path, value, &mut violations),
                None if spec.required => {
                    violations.push(SchemaViolation::new(path, "missing required field"))
                }
                None => {}
            }
        }
    }
    violations
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Coerce `raw` to the primitive type the schema expects at `path`.
///
/// Command-line values always arrive as text, so strings are parsed into
/// numbers and booleans (and back) where the table says so. Paths outside
/// the table, and values that cannot be converted, are returned unchanged
/// so validation can report them.
pub fn coerce_value_for_schema(path: &str, raw: Value) -> Value {
    let Some(spec) = lookup_field(path) else {
        return raw;
    };

    if spec.nullable
        && let Value::String(s) = &raw
        && s.trim().eq_ignore_ascii_case("null")
    {
        return Value::Null;
    }

    match (spec.ty, raw) {
        (FieldType::Integer { .. }, Value::String(s)) => {
            let trimmed = s.trim();
            if let Ok(n) = trimmed.parse::<i64>() {
                Value::from(n)
            } else if let Ok(f) = trimmed.parse::<f64>()
                && f.fract() == 0.0
            {
                Value::from(f as i64)
            } else {
                Value::String(s)
            }
        }
        (FieldType::Integer { .. }, Value::Bool(b)) => Value::from(i64::from(b)),
        (FieldType::Boolean, Value::String(s)) => match parse_bool(&s) {
            Some(b) => Value::Bool(b),
            None => Value::String(s),
        },
        (FieldType::Boolean, Value::Number(n)) => Value::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
        (
            FieldType::String
            | FieldType::PhaseNumber
            | FieldType::Enum(_)
            | FieldType::Timestamp,
            Value::Number(n),
        ) => Value::String(n.to_string()),
        (
            FieldType::String
            | FieldType::PhaseNumber
            | FieldType::Enum(_)
            | FieldType::Timestamp,
            Value::Bool(b),
        ) => Value::String(b.to_string()),
        (_, raw) => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_doc() -> Value {
        json!({
            "schema_version": "3.0",
            "project": {"id": "abc", "name": "demo", "path": "/tmp/demo"},
            "last_updated": "2026-01-01T00:00:00Z",
            "phase": {"number": "0010", "name": "Foundation", "branch": null, "status": "in_progress"},
            "step": {"current": "implement", "index": 2, "status": "in_progress"},
            "actions": {"history": []},
            "health": {"status": "ready", "last_check": null, "issue_count": 0},
            "gates": {"0010": "pending"},
            "migrations": []
        })
    }

    #[test]
    fn test_valid_document_has_no_violations() {
        assert!(validate(&valid_doc()).is_empty());
    }

    #[test]
    fn test_missing_required_fields_reported() {
        let violations = validate(&json!({"project": {"name": "x"}}));
        let paths: Vec<&str> = violations.iter().map(|v| v.path.as_str()).collect();
        assert!(paths.contains(&"schema_version"));
        assert!(paths.contains(&"project.id"));
        assert!(paths.contains(&"last_updated"));
    }

    #[test]
    fn test_type_and_enum_violations_reported() {
        let mut doc = valid_doc();
        doc["step"]["index"] = json!("two");
        doc["phase"]["status"] = json!("finished");
        doc["phase"]["number"] = json!("10");
        let violations = validate(&doc);
        assert_eq!(violations.len(), 3);
        assert!(violations.iter().any(|v| v.path == "step.index"));
        assert!(
            violations
                .iter()
                .any(|v| v.path == "phase.status" && v.reason.contains("finished"))
        );
        assert!(violations.iter().any(|v| v.path == "phase.number"));
    }

    #[test]
    fn test_step_index_out_of_range() {
        let mut doc = valid_doc();
        doc["step"]["index"] = json!(7);
        let violations = validate(&doc);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].reason.contains("out of range"));
    }

    #[test]
    fn test_map_entries_validated_with_wildcard() {
        let mut doc = valid_doc();
        doc["gates"]["0020"] = json!("maybe");
        let violations = validate(&doc);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "gates.0020");
    }

    #[test]
    fn test_history_entries_validated_per_index() {
        let mut doc = valid_doc();
        doc["actions"]["history"] = json!([
            {"type": "phase_completed", "phase_number": "0010", "phase_name": "A",
             "completed_at": "2026-01-02T00:00:00Z"},
            {"phase_number": "0020"}
        ]);
        let paths: Vec<String> = validate(&doc).into_iter().map(|v| v.path).collect();
        assert_eq!(
            paths,
            [
                "actions.history.1.type",
                "actions.history.1.phase_name",
                "actions.history.1.completed_at"
            ]
        );
    }

    #[test]
    fn test_migration_records_validated() {
        let mut doc = valid_doc();
        doc["migrations"] = json!([{"from": "2.0", "to": "3.0", "date": "yesterday"}, 7]);
        let violations = validate(&doc);
        let paths: Vec<&str> = violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, ["migrations.1", "migrations.0.date"]);
    }

    #[test]
    fn test_null_rejected_for_non_nullable() {
        let mut doc = valid_doc();
        doc["step"]["status"] = Value::Null;
        let violations = validate(&doc);
        assert_eq!(violations[0].path, "step.status");
        assert_eq!(violations[0].reason, "must not be null");
    }

    #[test]
    fn test_lookup_field_resolves_wildcards() {
        assert_eq!(
            lookup_field("gates.0042").unwrap().ty,
            FieldType::Enum(GateStatus::VALUES)
        );
        assert!(lookup_field("gates").is_some());
        assert!(lookup_field("unknown.path").is_none());
    }

    #[test]
    fn test_coerce_string_to_integer_and_boolean() {
        assert_eq!(coerce_value_for_schema("step.index", json!("2")), json!(2));
        assert_eq!(coerce_value_for_schema("step.index", json!("2.0")), json!(2));
        assert_eq!(
            coerce_value_for_schema("phase.has_user_gate", json!("yes")),
            json!(true)
        );
        assert_eq!(
            coerce_value_for_schema("phase.has_user_gate", json!(0)),
            json!(false)
        );
    }

    #[test]
    fn test_coerce_number_to_string() {
        assert_eq!(
            coerce_value_for_schema("project.name", json!(42)),
            json!("42")
        );
    }

    #[test]
    fn test_coerce_null_for_nullable_only() {
        assert_eq!(
            coerce_value_for_schema("step.current", json!("null")),
            Value::Null
        );
        assert_eq!(
            coerce_value_for_schema("step.status", json!("null")),
            json!("null")
        );
    }

    #[test]
    fn test_coerce_leaves_unknown_and_unparseable_values() {
        assert_eq!(
            coerce_value_for_schema("custom.field", json!("7")),
            json!("7")
        );
        assert_eq!(
            coerce_value_for_schema("step.index", json!("abc")),
            json!("abc")
        );
    }
}
