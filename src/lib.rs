//! # recordkv
//!
//! An embedded record store with secondary indexes, built on an ordered
//! transactional key-value engine.
//!
//! ## Layers
//! - engine: skip list memtable made durable by a write-ahead log, with
//!   optimistic concurrency control (`memtable`, `wal`, `store`)
//! - transactions over string keys with read-your-writes (`txn`)
//! - prefix listing with resumable pagination (`list`)
//! - secondary indexes as posting entries plus counts (`index`)
//! - records with auto-generated ids, kept in sync with their indexes
//!   (`model`, `schema`)
//!
//! ## Key space
//! Keys are colon-delimited and ordered byte-wise:
//! ```text
//! {model}:{id}                        record
//! _i:{model}:{field}:{value}:{id}     posting entry
//! _ic:{model}:{field}:{value}         posting count
//! _counter:{model}                    last generated id
//! _id_len:{model}                     id padding width
//! _total:{model}                      live records
//! ```

pub mod codec;
pub mod db;
pub mod error;
pub mod index;
pub mod iterator;
pub mod list;
pub mod memtable;
pub mod model;
pub mod schema;
pub mod store;
pub mod txn;
pub mod types;
pub mod value;
pub mod wal;

// Public re-exports for the top-level API
pub use db::{Db, Options, RetryPolicy, Stats};
pub use error::{Error, Result};
pub use iterator::{StorageIterator, TxnIterator};
pub use list::ListOptions;
pub use schema::{IndexField, Model, ScalarKind, Schema, Shape};
pub use txn::Txn;
pub use value::Value;
pub use wal::SyncPolicy;
