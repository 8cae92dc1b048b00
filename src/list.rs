//! Prefix listing with resumable pagination.
//!
//! `scan` is written against `StorageIterator`, so the same algorithm runs
//! over a transaction cursor or a raw skip list iterator.

use std::ops::ControlFlow;

use crate::codec;
use crate::error::{Error, Result};
use crate::iterator::StorageIterator;
use crate::txn::Txn;

/// Options for a listing.
///
/// `begin` positions the cursor; without `contain_begin` it is a resume-after
/// cursor, so the key equal to `begin` itself is skipped. `limit == 0` means
/// unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub begin: Option<String>,
    pub contain_begin: bool,
    pub reverse: bool,
    pub limit: usize,
    pub key_only: bool,
}

impl ListOptions {
    pub fn new() -> Self {
        ListOptions::default()
    }

    pub fn with_begin(mut self, begin: impl Into<String>) -> Self {
        self.begin = Some(begin.into());
        self
    }

    pub fn with_contain_begin(mut self, contain_begin: bool) -> Self {
        self.contain_begin = contain_begin;
        self
    }

    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_key_only(mut self, key_only: bool) -> Self {
        self.key_only = key_only;
        self
    }
}

/// Smallest key greater than every key starting with `prefix`, or `None`
/// when no such key exists (empty prefix or all `0xff`).
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Visit every key starting with `prefix`, honoring `opts`.
///
/// The visitor gets the key and, unless `key_only`, the decompressed value.
/// Returning `ControlFlow::Break(())` or `Err(Error::StopIteration)` ends the
/// listing successfully; any other error aborts it and is returned.
pub fn scan<I, F>(iter: &mut I, prefix: &[u8], opts: &ListOptions, mut visit: F) -> Result<()>
where
    I: StorageIterator,
    F: FnMut(&str, Option<&[u8]>) -> Result<ControlFlow<()>>,
{
    let begin = opts.begin.as_deref().map(str::as_bytes);

    match (begin, opts.reverse) {
        (Some(begin), false) => iter.seek(begin)?,
        (Some(begin), true) => iter.seek_for_prev(begin)?,
        (None, false) => iter.seek(prefix)?,
        (None, true) => match prefix_successor(prefix) {
            Some(end) => {
                iter.seek_for_prev(&end)?;
                if iter.is_valid() && iter.key() == end.as_slice() {
                    iter.prev()?;
                }
            }
            None => iter.seek_to_last()?,
        },
    }

    if let Some(begin) = begin {
        if !opts.contain_begin && iter.is_valid() && iter.key() == begin {
            advance(iter, opts.reverse)?;
        }
    }

    let mut yielded = 0usize;
    while iter.is_valid() && iter.key().starts_with(prefix) {
        if opts.limit > 0 && yielded >= opts.limit {
            break;
        }

        let key = String::from_utf8_lossy(iter.key()).into_owned();
        let value = if opts.key_only {
            None
        } else {
            Some(codec::unpack(iter.value()))
        };
        yielded += 1;

        match visit(&key, value.as_deref()) {
            Ok(ControlFlow::Continue(())) => {}
            Ok(ControlFlow::Break(())) | Err(Error::StopIteration) => return Ok(()),
            Err(e) => return Err(e),
        }

        advance(iter, opts.reverse)?;
    }
    Ok(())
}

fn advance<I: StorageIterator>(iter: &mut I, reverse: bool) -> Result<()> {
    if reverse { iter.prev() } else { iter.next() }
}

impl Txn {
    /// List keys starting with `prefix` in this transaction's view.
    pub fn list<F>(&self, prefix: &str, opts: &ListOptions, visit: F) -> Result<()>
    where
        F: FnMut(&str, Option<&[u8]>) -> Result<ControlFlow<()>>,
    {
        let mut iter = self.iter(opts.key_only);
        scan(&mut iter, prefix.as_bytes(), opts, visit)
    }

    /// Keys starting with `prefix`, collected.
    pub fn list_keys(&self, prefix: &str, opts: &ListOptions) -> Result<Vec<String>> {
        let opts = ListOptions {
            key_only: true,
            ..opts.clone()
        };
        let mut keys = Vec::new();
        self.list(prefix, &opts, |key, _| {
            keys.push(key.to_string());
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successor_increments_last_byte() {
        assert_eq!(prefix_successor(b"user:"), Some(b"user;".to_vec()));
        assert_eq!(prefix_successor(b"a\xff"), Some(b"b".to_vec()));
        assert_eq!(prefix_successor(b"\xff\xff"), None);
        assert_eq!(prefix_successor(b""), None);
    }
}
