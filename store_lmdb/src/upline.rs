//! LMDB implementation of UplineDirectory.
//!
//! Key formats:
//! - referrers: `user` → bincode `Referral`
//! - referrals: `referrer ‖ 0x00 ‖ enrolled_be ‖ user` → bincode `Referral`

use std::ops::Bound;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env};

use yalls_store::{Referral, StoreError, UplineDirectory};
use yalls_types::UserId;

use crate::keys::{referral_index_key, user_range};
use crate::LmdbError;

pub struct LmdbUplineDirectory {
    pub(crate) env: Arc<Env>,
    pub(crate) referrers_db: Database<Bytes, Bytes>,
    pub(crate) referrals_db: Database<Bytes, Bytes>,
}

impl UplineDirectory for LmdbUplineDirectory {
    fn set_referrer(&self, referral: &Referral) -> Result<(), StoreError> {
        let key = referral.user.as_str().as_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self
            .referrers_db
            .get(&wtxn, key)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(StoreError::Duplicate(format!("referrer of {}", referral.user)));
        }
        let bytes = bincode::serialize(referral).map_err(LmdbError::from)?;
        let index = referral_index_key(&referral.referrer, referral.enrolled_at, &referral.user);
        self.referrers_db
            .put(&mut wtxn, key, &bytes)
            .map_err(LmdbError::from)?;
        self.referrals_db
            .put(&mut wtxn, &index, &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn referrer_of(&self, user: &UserId) -> Result<Option<UserId>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self
            .referrers_db
            .get(&rtxn, user.as_str().as_bytes())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => {
                let referral: Referral = bincode::deserialize(bytes).map_err(LmdbError::from)?;
                Ok(Some(referral.referrer))
            }
            None => Ok(None),
        }
    }

    fn direct_referrals(&self, referrer: &UserId) -> Result<Vec<Referral>, StoreError> {
        let (lower, upper) = user_range(referrer);
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let bounds = (
            Bound::Included(lower.as_slice()),
            Bound::Excluded(upper.as_slice()),
        );
        let iter = self
            .referrals_db
            .rev_range(&rtxn, &bounds)
            .map_err(LmdbError::from)?;
        let mut results = Vec::new();
        for entry in iter {
            let (_key, val) = entry.map_err(LmdbError::from)?;
            results.push(bincode::deserialize(val).map_err(LmdbError::from)?);
        }
        Ok(results)
    }
}
