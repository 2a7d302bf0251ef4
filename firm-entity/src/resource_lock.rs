//! Explicit per-pass resource locking.
//!
//! spec.md's resource-lock contract (§4.1, §5) turns "I used stale dominance
//! info because some other pass invalidated it out from under me" into a
//! loud, immediate error instead of a silently wrong compile. Each analysis
//! declares the resources it touches; acquiring an already-held resource or
//! releasing one that isn't held is a bug in the pass manager, not a
//! recoverable condition, hence `Error` rather than a boolean return.
//!
//! This has no direct analogue in the teacher (cranelift recomputes lazily
//! behind a `valid: bool` flag per analysis instead of a shared lock table)
//! but is written in the same "small `Copy` handle, explicit accessor
//! methods" style as the teacher's own cache-invalidation fields.

use thiserror::Error;

/// The resources spec.md §4.1 names explicitly. Implementations may extend
/// this if a pass needs a bespoke resource, but these five cover the core.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Resource {
    Dominance,
    PostDominance,
    LoopInfo,
    OutEdges,
    Liveness,
    LinkField,
    NodeVisited,
}

const RESOURCE_COUNT: usize = 7;

fn resource_bit(r: Resource) -> usize {
    match r {
        Resource::Dominance => 0,
        Resource::PostDominance => 1,
        Resource::LoopInfo => 2,
        Resource::OutEdges => 3,
        Resource::Liveness => 4,
        Resource::LinkField => 5,
        Resource::NodeVisited => 6,
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("resource {0:?} is already locked")]
    ResourceBusy(Resource),
    #[error("resource {0:?} was not locked")]
    ResourceUnderflow(Resource),
}

/// A per-graph bitmask of currently-held resource locks.
#[derive(Clone, Copy, Default)]
pub struct ResourceLocks {
    held: u32,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self { held: 0 }
    }

    pub fn is_locked(&self, r: Resource) -> bool {
        self.held & (1 << resource_bit(r)) != 0
    }

    /// Acquire `r`. Fails loudly if it is already held: that means two
    /// passes both believe they own the same analysis info concurrently,
    /// which the single-threaded cooperative model (spec.md §5) never
    /// permits.
    pub fn lock(&mut self, r: Resource) -> Result<(), Error> {
        if self.is_locked(r) {
            return Err(Error::ResourceBusy(r));
        }
        self.held |= 1 << resource_bit(r);
        Ok(())
    }

    /// Release `r`. Fails if it wasn't held: releasing twice, or releasing
    /// a resource acquired by a different pass, is a pass-manager bug.
    pub fn unlock(&mut self, r: Resource) -> Result<(), Error> {
        if !self.is_locked(r) {
            return Err(Error::ResourceUnderflow(r));
        }
        self.held &= !(1 << resource_bit(r));
        Ok(())
    }
}

const _: () = assert!(RESOURCE_COUNT <= 32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_lock_fails() {
        let mut locks = ResourceLocks::new();
        locks.lock(Resource::Dominance).unwrap();
        assert!(matches!(
            locks.lock(Resource::Dominance),
            Err(Error::ResourceBusy(Resource::Dominance))
        ));
    }

    #[test]
    fn unlock_without_lock_fails() {
        let mut locks = ResourceLocks::new();
        assert!(matches!(
            locks.unlock(Resource::Liveness),
            Err(Error::ResourceUnderflow(Resource::Liveness))
        ));
    }

    #[test]
    fn lock_unlock_relock() {
        let mut locks = ResourceLocks::new();
        locks.lock(Resource::OutEdges).unwrap();
        locks.unlock(Resource::OutEdges).unwrap();
        locks.lock(Resource::OutEdges).unwrap();
        assert!(locks.is_locked(Resource::OutEdges));
    }

    #[test]
    fn independent_resources_dont_interfere() {
        let mut locks = ResourceLocks::new();
        locks.lock(Resource::Dominance).unwrap();
        locks.lock(Resource::Liveness).unwrap();
        assert!(locks.is_locked(Resource::Dominance));
        assert!(locks.is_locked(Resource::Liveness));
    }
}
