//! Metadata storage trait.

use crate::StoreError;

/// Bookkeeping that belongs to the database rather than the domain.
pub trait MetaStore {
    /// Stored schema version; 0 for a fresh database.
    fn get_schema_version(&self) -> Result<u32, StoreError>;

    fn set_schema_version(&self, version: u32) -> Result<(), StoreError>;
}
