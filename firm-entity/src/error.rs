//! Errors owned by the identity layer: resource-lock discipline violations.
//! See spec.md §7. Construction/mutation/SSA errors live in `firm-ir` and
//! `firm-ssa`; register-allocation errors live in `firm-regalloc`.

pub use crate::resource_lock::Error;
