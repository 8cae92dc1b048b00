//! Secondary indexes: posting entries plus a count per indexed value.
//!
//! Key layout:
//! - `_i:{model}:{field}:{value}:{id}` posting entry, empty value
//! - `_ic:{model}:{field}:{value}` number of posting entries for the value
//!
//! The count is maintained alongside the postings in the same transaction
//! and is never recomputed by scanning. `value` is the normalized form
//! (see [`Value::normalize`]); values that do not normalize are never
//! indexed, so the operations below treat them as empty.
//!
//! Neither the value nor the id may contain `:` if listings are to stay
//! exact; a value that is a prefix of another (`a` and `a:b`) would share
//! postings.

use std::ops::ControlFlow;

use tracing::debug;

use crate::error::Result;
use crate::list::ListOptions;
use crate::schema::Model;
use crate::txn::Txn;
use crate::value::Value;

fn posting_prefix(model: &str, field: &str, value: &str) -> String {
    format!("_i:{model}:{field}:{value}:")
}

fn posting_key(model: &str, field: &str, value: &str, id: &str) -> String {
    format!("_i:{model}:{field}:{value}:{id}")
}

fn count_key(model: &str, field: &str, value: &str) -> String {
    format!("_ic:{model}:{field}:{value}")
}

impl Txn {
    /// Record that `id` has `field == value`. Adding an existing posting is a
    /// no-op.
    pub fn index_add(&self, model: &str, field: &str, value: impl Into<Value>, id: &str) -> Result<()> {
        let Some(value) = value.into().normalize() else {
            return Ok(());
        };

        let key = posting_key(model, field, &value, id);
        if self.has(&key)? {
            return Ok(());
        }
        self.set(&key, "")?;
        let count = self.increment(&count_key(model, field, &value), 1)?;
        debug!(model, field, value = %value, id, count, "index add");
        Ok(())
    }

    /// Retract `field == value` for `id`. Removing an absent posting is a
    /// no-op and leaves the count alone.
    pub fn index_del(&self, model: &str, field: &str, value: impl Into<Value>, id: &str) -> Result<()> {
        let Some(value) = value.into().normalize() else {
            return Ok(());
        };

        let key = posting_key(model, field, &value, id);
        if !self.has(&key)? {
            return Ok(());
        }
        self.delete(&key)?;
        let count = self.decrement(&count_key(model, field, &value), 1)?;
        debug!(model, field, value = %value, id, count, "index del");
        Ok(())
    }

    /// Ids with `field == value`, in id order.
    ///
    /// `opts.begin` is an id; listing is always key-only.
    pub fn index_list(
        &self,
        model: &str,
        field: &str,
        value: impl Into<Value>,
        opts: &ListOptions,
    ) -> Result<Vec<String>> {
        let Some(value) = value.into().normalize() else {
            return Ok(Vec::new());
        };

        let prefix = posting_prefix(model, field, &value);
        let opts = ListOptions {
            begin: opts.begin.as_ref().map(|id| format!("{prefix}{id}")),
            key_only: true,
            ..opts.clone()
        };

        let mut ids = Vec::new();
        self.list(&prefix, &opts, |key, _| {
            if let Some(id) = key.strip_prefix(prefix.as_str()) {
                ids.push(id.to_string());
            }
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(ids)
    }

    /// Stored count for `field == value`; 0 when absent.
    pub fn index_count(&self, model: &str, field: &str, value: impl Into<Value>) -> Result<i64> {
        let Some(value) = value.into().normalize() else {
            return Ok(0);
        };
        match self.unmarshal(&count_key(model, field, &value)) {
            Ok(count) => Ok(count),
            Err(e) if e.is_not_found() => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Smallest id with `field == value`.
    pub fn index_first(&self, model: &str, field: &str, value: impl Into<Value>) -> Result<Option<String>> {
        let opts = ListOptions::new().with_limit(1);
        Ok(self.index_list(model, field, value, &opts)?.into_iter().next())
    }

    /// Drop every posting for `field == value` and its count.
    pub fn index_clear(&self, model: &str, field: &str, value: impl Into<Value>) -> Result<()> {
        let Some(value) = value.into().normalize() else {
            return Ok(());
        };

        let prefix = posting_prefix(model, field, &value);
        let opts = ListOptions::new().with_key_only(true);
        let mut cleared = 0usize;
        self.list(&prefix, &opts, |key, _| {
            self.delete(key)?;
            cleared += 1;
            Ok(ControlFlow::Continue(()))
        })?;
        self.delete(&count_key(model, field, &value))?;
        debug!(model, field, value = %value, cleared, "index clear");
        Ok(())
    }

    /// Add (`is_create`) or retract every index value `record` declares.
    pub fn index_model<M: Model>(&self, id: &str, record: &M, is_create: bool) -> Result<()> {
        let schema = M::schema();
        for (index, value) in schema.extract(record)? {
            if is_create {
                self.index_add(schema.model(), &index, value, id)?;
            } else {
                self.index_del(schema.model(), &index, value, id)?;
            }
        }
        Ok(())
    }
}
