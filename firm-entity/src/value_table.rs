//! Structural value-numbering: the graph-scoped hash set keyed on
//! `(opcode, mode, attributes, inputs)` that lets construction of an
//! already-seen node return the canonical earlier node instead.
//!
//! Grounded on `cranelift/codegen/src/ctxhash.rs`'s "external hashing" idea:
//! the key type being interned (a node) refers to its inputs by index into
//! the owning graph's node table, so equality and hashing need that table as
//! context. We keep the same split: a `CtxEq`/`CtxHash` pair implemented by
//! the *context* (the node table), not by the key itself.

use hashbrown::raw::RawTable;
use std::hash::{Hash, Hasher};

/// Equality under some external context `Ctx` (the node table).
pub trait CtxEq<V1: ?Sized, V2: ?Sized> {
    fn ctx_eq(&self, a: &V1, b: &V2) -> bool;
}

/// Hashing under some external context `Ctx`.
pub trait CtxHash<V: ?Sized>: CtxEq<V, V> {
    fn ctx_hash(&self, value: &V) -> u64;
}

struct Bucket<K> {
    hash: u64,
    key: K,
}

fn compute_hash<Ctx, K>(ctx: &Ctx, key: &K) -> u64
where
    Ctx: CtxHash<K>,
{
    ctx.ctx_hash(key)
}

/// A set of keys `K` (typically a node index), deduplicated by a
/// caller-supplied `Ctx` that knows how to compare/hash `K`s referring into
/// some other owned storage.
///
/// `insert` returns either the just-inserted key or whichever
/// previously-inserted key it's equal to under the context, implementing the
/// value-table contract of spec.md §3 ("insertion returns either the
/// newly-inserted node or a previously interned equivalent").
pub struct ValueTable<K> {
    raw: RawTable<Bucket<K>>,
}

impl<K: Copy> ValueTable<K> {
    pub fn new() -> Self {
        Self {
            raw: RawTable::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: RawTable::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Insert `key`, returning `key` itself if no equal entry (under `ctx`)
    /// was already present, or the canonical previously-interned key if one
    /// was.
    pub fn insert<Ctx>(&mut self, ctx: &Ctx, key: K) -> K
    where
        Ctx: CtxHash<K>,
    {
        let hash = compute_hash(ctx, &key);
        match self
            .raw
            .find(hash, |bucket| hash == bucket.hash && ctx.ctx_eq(&bucket.key, &key))
        {
            Some(bucket) => unsafe { bucket.as_ref().key },
            None => {
                self.raw
                    .insert_entry(hash, Bucket { hash, key }, |bucket| bucket.hash);
                key
            }
        }
    }

    /// Look up `key` without inserting it.
    pub fn find<Ctx>(&self, ctx: &Ctx, key: &K) -> Option<K>
    where
        Ctx: CtxHash<K>,
    {
        let hash = compute_hash(ctx, key);
        self.raw
            .find(hash, |bucket| hash == bucket.hash && ctx.ctx_eq(&bucket.key, key))
            .map(|bucket| unsafe { bucket.as_ref().key })
    }

    pub fn clear(&mut self) {
        self.raw.clear();
    }
}

impl<K: Copy> Default for ValueTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// A no-context comparator for keys that are already `Eq + Hash` on their
/// own — used by tests and by any table that doesn't need external context.
#[derive(Default)]
pub struct NullCtx;

impl<V: Eq + Hash> CtxEq<V, V> for NullCtx {
    fn ctx_eq(&self, a: &V, b: &V) -> bool {
        a == b
    }
}

impl<V: Eq + Hash> CtxHash<V> for NullCtx {
    fn ctx_hash(&self, value: &V) -> u64 {
        let mut hasher = rustc_hash::FxHasher::default();
        value.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_via_null_ctx() {
        let ctx = NullCtx;
        let mut table: ValueTable<u32> = ValueTable::new();
        let a = table.insert(&ctx, 7);
        let b = table.insert(&ctx, 7);
        assert_eq!(a, b);
        let c = table.insert(&ctx, 8);
        assert_ne!(a, c);
        assert_eq!(table.len(), 2);
    }

    struct ParityCtx;
    impl CtxEq<u32, u32> for ParityCtx {
        fn ctx_eq(&self, a: &u32, b: &u32) -> bool {
            a % 2 == b % 2
        }
    }
    impl CtxHash<u32> for ParityCtx {
        fn ctx_hash(&self, value: &u32) -> u64 {
            (value % 2) as u64
        }
    }

    #[test]
    fn external_context_drives_equality() {
        let ctx = ParityCtx;
        let mut table: ValueTable<u32> = ValueTable::new();
        let first_even = table.insert(&ctx, 4);
        let second_even = table.insert(&ctx, 10);
        assert_eq!(first_even, second_even, "both even, should intern to 4");
        let odd = table.insert(&ctx, 3);
        assert_eq!(odd, 3);
    }
}
