//! Versioned node data schemas.
//!
//! Each node type owns a [`DataSchema`]: the current `_version`, an ordered
//! list of pure migrations keyed by the version they upgrade from, and the
//! field declarations used to validate the migrated payload and fill defaults.

use crate::SchemaError;
use serde_json::{Map, Value as Json};

pub const VERSION_FIELD: &str = "_version";

pub type DataMap = Map<String, Json>;

/// Upgrades a payload from version N to N+1.
pub type MigrationFn = fn(DataMap) -> Result<DataMap, String>;

/// Extra validation over a fully normalized payload. Errors name the field.
pub type ValidatorFn = fn(&DataMap) -> Result<(), FieldIssue>;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Any,
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldKind {
    fn name(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Check a present value, coercing where the shape allows it.
    fn coerce(self, value: Json) -> Result<Json, Json> {
        match (self, value) {
            (Self::Any, v) => Ok(v),
            (Self::String, v @ Json::String(_)) => Ok(v),
            (Self::Number, v @ Json::Number(_)) => Ok(v),
            (Self::Number, Json::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Json::Number)
                .ok_or(Json::String(s)),
            (Self::Boolean, v @ Json::Bool(_)) => Ok(v),
            (Self::Array, v @ Json::Array(_)) => Ok(v),
            (Self::Object, v @ Json::Object(_)) => Ok(v),
            (_, v) => Err(v),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    /// `None` makes the field required.
    pub default: Option<Json>,
}

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub from_version: u32,
    pub apply: MigrationFn,
}

#[derive(Debug, Clone)]
pub struct DataSchema {
    version: u32,
    fields: Vec<FieldSpec>,
    migrations: Vec<Migration>,
    validator: Option<ValidatorFn>,
}

impl DataSchema {
    pub fn new(version: u32) -> Self {
        Self {
            version: version.max(1),
            fields: Vec::new(),
            migrations: Vec::new(),
            validator: None,
        }
    }

    /// Declare a field that must be present after migration.
    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            default: None,
        });
        self
    }

    /// Declare a field filled with `default` when absent.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind, default: Json) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            default: Some(default),
        });
        self
    }

    pub fn migration(mut self, from_version: u32, apply: MigrationFn) -> Self {
        self.migrations.push(Migration {
            from_version,
            apply,
        });
        self
    }

    pub fn validator(mut self, validator: ValidatorFn) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn current_version(&self) -> u32 {
        self.version
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Default payload for a freshly authored node.
    pub fn defaults(&self) -> Json {
        let mut map = DataMap::new();
        for field in &self.fields {
            if let Some(default) = &field.default {
                map.insert(field.name.clone(), default.clone());
            }
        }
        map.insert(VERSION_FIELD.to_string(), Json::from(self.version));
        Json::Object(map)
    }

    /// Read the payload's `_version`; absent means 1.
    pub fn payload_version(node_id: &str, map: &DataMap) -> Result<u32, SchemaError> {
        match map.get(VERSION_FIELD) {
            None | Some(Json::Null) => Ok(1),
            Some(v) => v
                .as_u64()
                .filter(|n| *n >= 1)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| SchemaError::InvalidField {
                    node_id: node_id.to_string(),
                    field: VERSION_FIELD.to_string(),
                    message: format!("expected a positive integer, got {}", v),
                }),
        }
    }

    /// Apply migrations until the payload reaches the current version.
    pub fn migrate(&self, node_id: &str, raw: &Json) -> Result<DataMap, SchemaError> {
        let mut map = match raw {
            Json::Null => DataMap::new(),
            Json::Object(map) => map.clone(),
            _ => {
                return Err(SchemaError::NotAnObject {
                    node_id: node_id.to_string(),
                })
            }
        };

        let mut version = Self::payload_version(node_id, &map)?;
        if version > self.version {
            return Err(SchemaError::UnsupportedVersion {
                node_id: node_id.to_string(),
                found: version,
                current: self.version,
            });
        }

        while version < self.version {
            let step = self
                .migrations
                .iter()
                .find(|m| m.from_version == version)
                .ok_or_else(|| SchemaError::Migration {
                    node_id: node_id.to_string(),
                    from: version,
                    message: "no migration registered".to_string(),
                })?;
            map = (step.apply)(map).map_err(|message| SchemaError::Migration {
                node_id: node_id.to_string(),
                from: version,
                message,
            })?;
            version += 1;
            map.insert(VERSION_FIELD.to_string(), Json::from(version));
            tracing::debug!(node_id, version, "Migrated node data");
        }

        Ok(map)
    }

    /// Migrate, validate and fill defaults. The result carries `_version`.
    pub fn normalize(&self, node_id: &str, raw: &Json) -> Result<Json, SchemaError> {
        let mut map = self.migrate(node_id, raw)?;

        for field in &self.fields {
            let present = map.remove(&field.name).filter(|v| !v.is_null());
            let value = match (present, &field.default) {
                (Some(value), _) => {
                    field
                        .kind
                        .coerce(value)
                        .map_err(|found| SchemaError::InvalidField {
                            node_id: node_id.to_string(),
                            field: field.name.clone(),
                            message: format!("expected {}, got {}", field.kind.name(), found),
                        })?
                }
                (None, Some(default)) => default.clone(),
                (None, None) => {
                    return Err(SchemaError::MissingField {
                        node_id: node_id.to_string(),
                        field: field.name.clone(),
                    })
                }
            };
            map.insert(field.name.clone(), value);
        }

        if let Some(validate) = self.validator {
            validate(&map).map_err(|issue| SchemaError::InvalidField {
                node_id: node_id.to_string(),
                field: issue.field,
                message: issue.message,
            })?;
        }

        map.insert(VERSION_FIELD.to_string(), Json::from(self.version));
        Ok(Json::Object(map))
    }
}
