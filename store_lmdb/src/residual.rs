//! LMDB implementation of ResidualStore.
//!
//! Key format: `earner ‖ 0x00 ‖ created_be ‖ residual_id` → bincode `ResidualRecord`.

use std::ops::Bound;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env};

use yalls_store::{ResidualRecord, ResidualStore, StoreError};
use yalls_types::UserId;

use crate::keys::{residual_key, user_range};
use crate::LmdbError;

pub struct LmdbResidualStore {
    pub(crate) env: Arc<Env>,
    pub(crate) residuals_db: Database<Bytes, Bytes>,
}

impl ResidualStore for LmdbResidualStore {
    fn put_residuals(&self, records: &[ResidualRecord]) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        for record in records {
            let key = residual_key(&record.earner, record.created_at, &record.id);
            let bytes = bincode::serialize(record).map_err(LmdbError::from)?;
            self.residuals_db
                .put(&mut wtxn, &key, &bytes)
                .map_err(LmdbError::from)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn residuals_for_user(&self, earner: &UserId) -> Result<Vec<ResidualRecord>, StoreError> {
        let (lower, upper) = user_range(earner);
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let bounds = (
            Bound::Included(lower.as_slice()),
            Bound::Excluded(upper.as_slice()),
        );
        let iter = self
            .residuals_db
            .range(&rtxn, &bounds)
            .map_err(LmdbError::from)?;
        let mut results = Vec::new();
        for entry in iter {
            let (_key, val) = entry.map_err(LmdbError::from)?;
            let record: ResidualRecord = bincode::deserialize(val).map_err(LmdbError::from)?;
            results.push(record);
        }
        Ok(results)
    }

    fn recent_residuals(
        &self,
        earner: &UserId,
        limit: Option<usize>,
    ) -> Result<Vec<ResidualRecord>, StoreError> {
        let (lower, upper) = user_range(earner);
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let bounds = (
            Bound::Included(lower.as_slice()),
            Bound::Excluded(upper.as_slice()),
        );
        let iter = self
            .residuals_db
            .rev_range(&rtxn, &bounds)
            .map_err(LmdbError::from)?;
        let mut results = Vec::new();
        for entry in iter.take(limit.unwrap_or(usize::MAX)) {
            let (_key, val) = entry.map_err(LmdbError::from)?;
            let record: ResidualRecord = bincode::deserialize(val).map_err(LmdbError::from)?;
            results.push(record);
        }
        Ok(results)
    }
}
