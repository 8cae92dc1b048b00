//! Records with auto-generated ids and synchronized indexes.
//!
//! Per model the store keeps:
//! - `{model}:{id}` the serialized record
//! - `_counter:{model}` last id handed out by `model_next_id`
//! - `_id_len:{model}` width ids were last padded to
//! - `_total:{model}` number of live records

use std::ops::ControlFlow;

use crate::codec;
use crate::error::Result;
use crate::list::ListOptions;
use crate::schema::Model;
use crate::txn::Txn;
use crate::value::Value;

/// `n` zero-padded to `width` digits. Wider numbers are not truncated.
pub fn pad_id(n: i64, width: usize) -> String {
    format!("{n:0width$}")
}

fn record_key(model: &str, id: &str) -> String {
    format!("{model}:{id}")
}

fn counter_key(model: &str) -> String {
    format!("_counter:{model}")
}

fn id_len_key(model: &str) -> String {
    format!("_id_len:{model}")
}

fn total_key(model: &str) -> String {
    format!("_total:{model}")
}

impl Txn {
    /// Bump the model counter and return it padded to `width`. Ids sort in
    /// counter order as long as the counter fits in `width` digits.
    pub fn model_next_id<M: Model>(&self, width: usize) -> Result<String> {
        let model = M::schema().model();
        let next = self.increment(&counter_key(model), 1)?;
        self.set_value(&id_len_key(model), &width)?;
        Ok(pad_id(next, width))
    }

    pub fn model_counter<M: Model>(&self) -> Result<i64> {
        self.read_or_zero(&counter_key(M::schema().model()))
    }

    pub fn model_total<M: Model>(&self) -> Result<i64> {
        self.read_or_zero(&total_key(M::schema().model()))
    }

    pub fn model_id_len<M: Model>(&self) -> Result<usize> {
        self.read_or_zero(&id_len_key(M::schema().model()))
    }

    /// Write `record` under `id`, moving its index entries from the stored
    /// version (if any) to the new one.
    pub fn model_set<M: Model>(&self, record: &M, id: &str) -> Result<()> {
        let model = M::schema().model();
        let key = record_key(model, id);

        match self.unmarshal::<M>(&key) {
            Ok(old) => self.index_model(id, &old, false)?,
            Err(e) if e.is_not_found() => {
                self.increment(&total_key(model), 1)?;
            }
            Err(e) => return Err(e),
        }
        self.index_model(id, record, true)?;
        self.set_value(&key, record)
    }

    /// Remove the record under `id` with its index entries. Returns the
    /// removed record, or `None` if there was none.
    pub fn model_del<M: Model>(&self, id: &str) -> Result<Option<M>> {
        let model = M::schema().model();
        let key = record_key(model, id);

        let old = match self.unmarshal::<M>(&key) {
            Ok(old) => old,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        self.index_model(id, &old, false)?;
        self.decrement(&total_key(model), 1)?;
        self.delete(&key)?;
        Ok(Some(old))
    }

    /// Load the record under `id`, let `mutate` change it, and store it back
    /// through `model_set`. Fails with `KeyNotFound` if there is no record.
    pub fn model_update<M, F>(&self, id: &str, mutate: F) -> Result<M>
    where
        M: Model,
        F: FnOnce(&mut M) -> Result<()>,
    {
        let mut record = self.model_get::<M>(id)?;
        mutate(&mut record)?;
        self.model_set(&record, id)?;
        Ok(record)
    }

    pub fn model_get<M: Model>(&self, id: &str) -> Result<M> {
        self.unmarshal(&record_key(M::schema().model(), id))
    }

    /// Up to `limit` records (0 = all) in id order, resuming after the id
    /// `begin`.
    ///
    /// In reverse without `begin` the listing starts from the current counter,
    /// i.e. the newest generated id; with no generated ids yet it starts from
    /// the last record key.
    pub fn model_list<M: Model>(&self, limit: usize, begin: Option<&str>, reverse: bool) -> Result<Vec<M>> {
        let model = M::schema().model();
        let prefix = format!("{model}:");

        let mut opts = ListOptions::new().with_limit(limit).with_reverse(reverse);
        match begin {
            Some(id) => opts = opts.with_begin(record_key(model, id)),
            None if reverse => {
                let counter = self.model_counter::<M>()?;
                if counter > 0 {
                    let id = pad_id(counter, self.model_id_len::<M>()?);
                    opts = opts.with_begin(record_key(model, &id)).with_contain_begin(true);
                }
            }
            None => {}
        }

        let mut records = Vec::new();
        self.list(&prefix, &opts, |key, value| {
            records.push(codec::unmarshal(key, value.unwrap_or_default())?);
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(records)
    }

    /// Records with `field == value`, fetched one by one from the index.
    pub fn model_index_list<M: Model>(
        &self,
        field: &str,
        value: impl Into<Value>,
        opts: &ListOptions,
    ) -> Result<Vec<M>> {
        let ids = self.index_list(M::schema().model(), field, value, opts)?;
        ids.iter().map(|id| self.model_get(id)).collect()
    }

    fn read_or_zero<T: Default + serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        match self.unmarshal(key) {
            Ok(v) => Ok(v),
            Err(e) if e.is_not_found() => Ok(T::default()),
            Err(e) => Err(e),
        }
    }
}
