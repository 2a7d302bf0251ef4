//! Errors raised by the analysis passes (spec.md §7): resource-lock
//! violations propagated from `firm-entity`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Resource(#[from] firm_entity::resource_lock::Error),
}
