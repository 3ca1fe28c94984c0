//! LMDB implementation of PayoutStore.
//!
//! Three databases cooperate:
//! - `payouts`: `payout_id` → bincode `PayoutRecord`
//! - `payouts_by_user`: `user ‖ 0x00 ‖ created_be ‖ payout_id` → `payout_id`
//! - `idempotency`: `user ‖ 0x00 ‖ key` → `payout_id`
//!
//! An insert checks both dedup paths and writes all three in one write
//! transaction, so a committed record is always fully indexed.

use std::ops::Bound;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, RoTxn};

use yalls_store::payout::check_transition;
use yalls_store::{PayoutRecord, PayoutStore, StoreError};
use yalls_types::{PayoutId, PayoutStatus, UserId};

use crate::keys::{idempotency_key, payout_index_key, user_range};
use crate::LmdbError;

pub struct LmdbPayoutStore {
    pub(crate) env: Arc<Env>,
    pub(crate) payouts_db: Database<Bytes, Bytes>,
    pub(crate) payouts_by_user_db: Database<Bytes, Bytes>,
    pub(crate) idempotency_db: Database<Bytes, Bytes>,
}

impl LmdbPayoutStore {
    fn read_record(&self, txn: &RoTxn, id: &[u8]) -> Result<Option<PayoutRecord>, LmdbError> {
        match self.payouts_db.get(txn, id)? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }
}

impl PayoutStore for LmdbPayoutStore {
    fn insert_payout(&self, record: &PayoutRecord) -> Result<PayoutRecord, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;

        if let Some(existing) = self.read_record(&wtxn, record.id.as_bytes())? {
            tracing::debug!(payout_id = %record.id, "payout id already stored");
            return Ok(existing);
        }

        let token_key = record
            .idempotency_key
            .as_ref()
            .map(|token| idempotency_key(&record.user_id, token));
        if let Some(ref token_key) = token_key {
            let prior_id = self
                .idempotency_db
                .get(&wtxn, token_key)
                .map_err(LmdbError::from)?
                .map(<[u8]>::to_vec);
            if let Some(prior_id) = prior_id {
                let existing = self.read_record(&wtxn, &prior_id)?.ok_or_else(|| {
                    StoreError::Corruption(format!(
                        "idempotency entry for {} points at a missing payout",
                        record.user_id
                    ))
                })?;
                tracing::debug!(payout_id = %existing.id, "idempotency key already used");
                return Ok(existing);
            }
        }

        let bytes = bincode::serialize(record).map_err(LmdbError::from)?;
        let id = record.id.as_bytes();
        self.payouts_db
            .put(&mut wtxn, id, &bytes)
            .map_err(LmdbError::from)?;
        let index_key = payout_index_key(&record.user_id, record.created_at, &record.id);
        self.payouts_by_user_db
            .put(&mut wtxn, &index_key, id)
            .map_err(LmdbError::from)?;
        if let Some(ref token_key) = token_key {
            self.idempotency_db
                .put(&mut wtxn, token_key, id)
                .map_err(LmdbError::from)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(record.clone())
    }

    fn get_payout(&self, id: &PayoutId) -> Result<PayoutRecord, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let record = self
            .read_record(&rtxn, id.as_bytes())?
            .ok_or_else(|| LmdbError::NotFound(format!("payout {id}")))?;
        Ok(record)
    }

    fn payouts_for_user(&self, user: &UserId) -> Result<Vec<PayoutRecord>, StoreError> {
        let (lower, upper) = user_range(user);
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let bounds = (
            Bound::Included(lower.as_slice()),
            Bound::Excluded(upper.as_slice()),
        );
        let iter = self
            .payouts_by_user_db
            .rev_range(&rtxn, &bounds)
            .map_err(LmdbError::from)?;
        let mut results = Vec::new();
        for entry in iter {
            let (_key, id) = entry.map_err(LmdbError::from)?;
            let record = self.read_record(&rtxn, id)?.ok_or_else(|| {
                StoreError::Corruption(format!("payout index for {user} points at a missing payout"))
            })?;
            results.push(record);
        }
        Ok(results)
    }

    fn update_payout_status(
        &self,
        id: &PayoutId,
        status: PayoutStatus,
    ) -> Result<PayoutRecord, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut record = self
            .read_record(&wtxn, id.as_bytes())?
            .ok_or_else(|| LmdbError::NotFound(format!("payout {id}")))?;
        check_transition(&record, status)?;
        record.status = status;
        let bytes = bincode::serialize(&record).map_err(LmdbError::from)?;
        self.payouts_db
            .put(&mut wtxn, id.as_bytes(), &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(record)
    }

    fn payout_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let count = self.payouts_db.len(&rtxn).map_err(LmdbError::from)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::test_support::temp_env;
    use yalls_types::{IdempotencyKey, Money, PayoutGateway, Timestamp};

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn pending(user: &str, cents: i64, at: u64, key: Option<&str>) -> PayoutRecord {
        PayoutRecord::pending(
            uid(user),
            Money::from_cents(cents),
            PayoutGateway::Stripe,
            Timestamp::from_millis(at),
            key.map(|k| IdempotencyKey::new(k).unwrap()),
        )
    }

    #[test]
    fn insert_and_get() {
        let (_dir, env) = temp_env();
        let store = env.payout_store();
        let record = pending("alice", 2500, 1_000, None);

        let stored = store.insert_payout(&record).unwrap();
        assert_eq!(stored, record);
        assert_eq!(store.get_payout(&record.id).unwrap(), record);
        assert_eq!(store.payout_count().unwrap(), 1);
    }

    #[test]
    fn missing_payout_is_not_found() {
        let (_dir, env) = temp_env();
        let result = env.payout_store().get_payout(&PayoutId::generate());
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn reinserting_same_id_is_noop() {
        let (_dir, env) = temp_env();
        let store = env.payout_store();
        let record = pending("alice", 2500, 1_000, None);
        store.insert_payout(&record).unwrap();

        let mut altered = record.clone();
        altered.amount = Money::from_cents(9999);
        assert_eq!(store.insert_payout(&altered).unwrap(), record);
        assert_eq!(store.payout_count().unwrap(), 1);
    }

    #[test]
    fn idempotency_key_returns_original_record() {
        let (_dir, env) = temp_env();
        let store = env.payout_store();
        let first = pending("alice", 2500, 1_000, Some("req-1"));
        let retry = pending("alice", 2500, 2_000, Some("req-1"));
        assert_ne!(first.id, retry.id);

        store.insert_payout(&first).unwrap();
        let stored = store.insert_payout(&retry).unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(store.payouts_for_user(&uid("alice")).unwrap().len(), 1);
    }

    #[test]
    fn idempotency_keys_are_scoped_per_user() {
        let (_dir, env) = temp_env();
        let store = env.payout_store();
        store.insert_payout(&pending("alice", 100, 1, Some("k"))).unwrap();
        store.insert_payout(&pending("bob", 100, 1, Some("k"))).unwrap();
        assert_eq!(store.payout_count().unwrap(), 2);
    }

    #[test]
    fn payouts_for_user_newest_first_and_isolated() {
        let (_dir, env) = temp_env();
        let store = env.payout_store();
        store.insert_payout(&pending("ann", 100, 1_000, None)).unwrap();
        store.insert_payout(&pending("ann", 200, 3_000, None)).unwrap();
        store.insert_payout(&pending("ann", 300, 2_000, None)).unwrap();
        store.insert_payout(&pending("anna", 400, 4_000, None)).unwrap();

        let amounts: Vec<Money> = store
            .payouts_for_user(&uid("ann"))
            .unwrap()
            .into_iter()
            .map(|p| p.amount)
            .collect();
        assert_eq!(
            amounts,
            vec![Money::from_cents(200), Money::from_cents(300), Money::from_cents(100)]
        );
        assert!(store.payouts_for_user(&uid("nobody")).unwrap().is_empty());
    }

    #[test]
    fn status_follows_lifecycle() {
        let (_dir, env) = temp_env();
        let store = env.payout_store();
        let record = pending("alice", 100, 1, None);
        store.insert_payout(&record).unwrap();

        let err = store
            .update_payout_status(&record.id, PayoutStatus::Completed)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        store
            .update_payout_status(&record.id, PayoutStatus::Processing)
            .unwrap();
        let done = store
            .update_payout_status(&record.id, PayoutStatus::Completed)
            .unwrap();
        assert_eq!(done.status, PayoutStatus::Completed);
        assert_eq!(
            store.get_payout(&record.id).unwrap().status,
            PayoutStatus::Completed
        );
    }
}
