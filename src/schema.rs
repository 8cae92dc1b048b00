//! Static index declarations for record types.
//!
//! A record type implements [`Model`] and returns a [`Schema`] built once:
//!
//! ```
//! use std::sync::LazyLock;
//! use recordkv::{IndexField, Model, Schema};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     name: String,
//!     email: String,
//!     tags: Vec<String>,
//! }
//!
//! static USER: LazyLock<Schema> = LazyLock::new(|| {
//!     Schema::new("User")
//!         .index(IndexField::new("email"))
//!         .index(IndexField::new("tags").named("tag").many())
//! });
//!
//! impl Model for User {
//!     fn schema() -> &'static Schema {
//!         &USER
//!     }
//! }
//! ```
//!
//! Field names refer to the record's serialized form, so serde renames apply.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::value::Value;

/// How a field's serialized value maps to index values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Shape {
    /// A single scalar.
    #[default]
    One,
    /// A sequence; each element is indexed.
    Many,
    /// A map; each value is indexed, keys are ignored.
    Mapping,
}

/// How scalars of a field are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScalarKind {
    #[default]
    Plain,
    /// Timestamps or dates, indexed by calendar date.
    Time,
}

/// One indexed field of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexField {
    pub field: String,
    /// Index name used in keys. Defaults to the lower-cased field name.
    pub index: String,
    pub shape: Shape,
    pub scalar: ScalarKind,
}

impl IndexField {
    pub fn new(field: &str) -> Self {
        IndexField {
            field: field.to_string(),
            index: field.to_lowercase(),
            shape: Shape::One,
            scalar: ScalarKind::Plain,
        }
    }

    pub fn named(mut self, index: &str) -> Self {
        self.index = index.to_string();
        self
    }

    pub fn many(mut self) -> Self {
        self.shape = Shape::Many;
        self
    }

    pub fn mapping(mut self) -> Self {
        self.shape = Shape::Mapping;
        self
    }

    pub fn time(mut self) -> Self {
        self.scalar = ScalarKind::Time;
        self
    }

    /// Index values this field contributes from the serialized record.
    fn values(&self, json: &serde_json::Value) -> Vec<Value> {
        let scalars: Vec<Value> = match (self.shape, json) {
            (Shape::One, serde_json::Value::Array(_) | serde_json::Value::Object(_)) => Vec::new(),
            (Shape::One, v) => vec![Value::from_json(v, self.scalar)],
            (Shape::Many, serde_json::Value::Array(items)) => {
                items.iter().map(|v| Value::from_json(v, self.scalar)).collect()
            }
            (Shape::Mapping, serde_json::Value::Object(map)) => {
                map.values().map(|v| Value::from_json(v, self.scalar)).collect()
            }
            _ => Vec::new(),
        };
        scalars.into_iter().filter(Value::is_scalar).collect()
    }
}

/// Model name plus its indexed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    model: String,
    fields: Vec<IndexField>,
}

impl Schema {
    /// The model name is lower-cased; it prefixes every key of the model.
    pub fn new(model: &str) -> Self {
        Schema {
            model: model.to_lowercase(),
            fields: Vec::new(),
        }
    }

    pub fn index(mut self, field: IndexField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn fields(&self) -> &[IndexField] {
        &self.fields
    }

    /// `(index name, value)` pairs to index for `record`.
    ///
    /// Absent and null fields, nested objects and values of the wrong shape
    /// are skipped.
    pub fn extract<T: Serialize + ?Sized>(&self, record: &T) -> Result<Vec<(String, Value)>> {
        let tree = serde_json::to_value(record).map_err(Error::Encode)?;
        let Some(object) = tree.as_object() else {
            return Ok(Vec::new());
        };

        let mut pairs = Vec::new();
        for field in &self.fields {
            if let Some(json) = object.get(&field.field) {
                for value in field.values(json) {
                    pairs.push((field.index.clone(), value));
                }
            }
        }
        Ok(pairs)
    }
}

/// A record type stored under `{model}:{id}`.
pub trait Model: Serialize + DeserializeOwned {
    fn schema() -> &'static Schema;
}
