//! Per-entity record transforms.
//!
//! A transform turns one raw artifact record into a store-ready payload. It
//! is pure: relation targets are checked against a [`ResolveContext`] the
//! orchestrator maintains, and anything that has to happen after the write
//! (child creation, back-reference patches) is returned as data.

use chrono::DateTime;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::database::schema::{ConflictPolicy, FieldDef, FieldType, Identity};
use crate::database::{EntityKind, Record};

/// How the registry treats one entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Standard,
    WithChildren {
        child: EntityKind,
        field: &'static str,
    },
    Child {
        parent_fk: &'static str,
    },
    Junction,
}

pub fn strategy(kind: EntityKind) -> Strategy {
    let def = kind.def();
    if let Identity::Compound { .. } = def.identity {
        Strategy::Junction
    } else if let Some(child) = def.children {
        Strategy::WithChildren {
            child: child.kind,
            field: child.field,
        }
    } else if let Some(parent) = def.parent {
        Strategy::Child { parent_fk: parent.fk }
    } else {
        Strategy::Standard
    }
}

/// Identities known to exist in the target store
#[derive(Debug, Default)]
pub struct ResolveContext {
    known: HashMap<EntityKind, HashSet<String>>,
}

impl ResolveContext {
    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.known
            .get(&kind)
            .map(|ids| ids.contains(id))
            .unwrap_or(false)
    }

    pub fn insert(&mut self, kind: EntityKind, id: impl Into<String>) {
        self.known.entry(kind).or_default().insert(id.into());
    }

    pub fn extend(&mut self, kind: EntityKind, ids: impl IntoIterator<Item = String>) {
        self.known.entry(kind).or_default().extend(ids);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeferredRelation {
    /// Patch `field` once `target_id` exists
    BackReference {
        field: &'static str,
        target: EntityKind,
        target_id: String,
    },
    /// Raw child records to create after the parent
    Children {
        kind: EntityKind,
        records: Vec<Value>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub payload: Record,
    pub deferred: Vec<DeferredRelation>,
    pub policy: ConflictPolicy,
    /// Optional relations dropped because their target is absent
    pub omitted: Vec<&'static str>,
}

impl Transformed {
    pub fn id(&self) -> Option<&str> {
        self.payload.get("id").and_then(Value::as_str)
    }
}

/// Why a record cannot be written
#[derive(Debug, Clone, PartialEq)]
pub enum RecordIssue {
    Malformed {
        reason: String,
    },
    MissingRelation {
        field: &'static str,
        target: EntityKind,
        target_id: Option<String>,
    },
}

impl fmt::Display for RecordIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordIssue::Malformed { reason } => write!(f, "malformed record: {}", reason),
            RecordIssue::MissingRelation {
                field,
                target,
                target_id: Some(id),
            } => write!(f, "required {} {} ({}) does not exist", target, id, field),
            RecordIssue::MissingRelation {
                field, target_id: None, ..
            } => write!(f, "required relation {} is missing", field),
        }
    }
}

fn malformed(reason: impl Into<String>) -> RecordIssue {
    RecordIssue::Malformed {
        reason: reason.into(),
    }
}

/// Extract a referenced identity from a scalar id or a `{"id": ...}` object
pub fn reference_id(value: &Value) -> Result<Option<String>, RecordIssue> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Object(object) => match object.get("id") {
            Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.clone())),
            None | Some(Value::Null) => Ok(None),
            Some(other) => Err(malformed(format!("relation id {} is not a string", other))),
        },
        other => Err(malformed(format!("relation value {} is not an id", other))),
    }
}

fn scalar(field: &FieldDef, value: &Value) -> Result<Value, RecordIssue> {
    if value.is_null() {
        if field.required {
            return Err(malformed(format!("{} is required", field.name)));
        }
        return Ok(Value::Null);
    }

    let valid = match field.ty {
        FieldType::Text => value.is_string(),
        FieldType::Integer => value.is_i64(),
        FieldType::Real => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Timestamp => value
            .as_str()
            .map(|s| DateTime::parse_from_rfc3339(s).is_ok())
            .unwrap_or(false),
    };

    if valid {
        Ok(value.clone())
    } else {
        Err(malformed(format!(
            "{} expected {:?}, got {}",
            field.name, field.ty, value
        )))
    }
}

/// Build the store payload for one raw record of `kind`
pub fn transform(
    kind: EntityKind,
    raw: &Value,
    ctx: &ResolveContext,
) -> Result<Transformed, RecordIssue> {
    let def = kind.def();
    let object = raw
        .as_object()
        .ok_or_else(|| malformed("record is not an object"))?;

    let mut payload = Record::new();
    let mut deferred = Vec::new();
    let mut omitted = Vec::new();

    if def.identity == Identity::Id {
        match object.get("id") {
            Some(Value::String(id)) if !id.is_empty() => {
                payload.insert("id".to_string(), Value::String(id.clone()));
            }
            _ => return Err(malformed("missing id")),
        }
    }

    for field in def.fields {
        let value = object.get(field.name).unwrap_or(&Value::Null);

        let Some(reference) = field.reference else {
            payload.insert(field.name.to_string(), scalar(field, value)?);
            continue;
        };

        let resolved = match reference_id(value)? {
            None if field.required => {
                return Err(RecordIssue::MissingRelation {
                    field: field.name,
                    target: reference.target,
                    target_id: None,
                })
            }
            None => Value::Null,
            Some(target_id) if reference.deferred => {
                deferred.push(DeferredRelation::BackReference {
                    field: field.name,
                    target: reference.target,
                    target_id,
                });
                Value::Null
            }
            Some(target_id) if ctx.contains(reference.target, &target_id) => {
                Value::String(target_id)
            }
            Some(target_id) if field.required => {
                return Err(RecordIssue::MissingRelation {
                    field: field.name,
                    target: reference.target,
                    target_id: Some(target_id),
                })
            }
            Some(_) => {
                omitted.push(field.name);
                Value::Null
            }
        };
        payload.insert(field.name.to_string(), resolved);
    }

    if let Strategy::WithChildren { child, field } = strategy(kind) {
        match object.get(field) {
            None | Some(Value::Null) => {}
            Some(Value::Array(records)) if records.is_empty() => {}
            Some(Value::Array(records)) => deferred.push(DeferredRelation::Children {
                kind: child,
                records: records.clone(),
            }),
            Some(_) => return Err(malformed(format!("{} is not a list", field))),
        }
    }

    Ok(Transformed {
        payload,
        deferred,
        policy: def.policy,
        omitted,
    })
}

/// Transform an embedded child, linking it to the parent just written
pub fn transform_child(
    kind: EntityKind,
    raw: &Value,
    parent_id: &str,
    ctx: &ResolveContext,
) -> Result<Transformed, RecordIssue> {
    let Strategy::Child { parent_fk } = strategy(kind) else {
        return transform(kind, raw, ctx);
    };
    let mut object = raw
        .as_object()
        .cloned()
        .ok_or_else(|| malformed("record is not an object"))?;
    object.insert(parent_fk.to_string(), Value::String(parent_id.to_string()));
    transform(kind, &Value::Object(object), ctx)
}
