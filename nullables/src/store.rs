//! Nullable store: thread-safe in-memory storage for testing.
//!
//! Mirrors the LMDB backend's semantics (idempotent payout inserts, per-user
//! idempotency keys, newest-first payout listing) and adds fault injection so
//! retry paths can be driven deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use yalls_store::payout::check_transition;
use yalls_store::{
    MetaStore, PayoutRecord, PayoutStore, ResidualRecord, ResidualStore, StoreError,
    Referral, UplineDirectory,
};
use yalls_types::{PayoutId, PayoutStatus, ResidualId, UserId};

#[derive(Default)]
struct Faults {
    fail_writes: u32,
    delayed_writes: u32,
    delay: Duration,
}

/// An in-memory payout, residual and referral store for testing.
/// Thread-safe for use with tokio's multi-threaded runtime.
pub struct NullStore {
    /// Payout records with their insertion sequence.
    payouts: Mutex<HashMap<PayoutId, (u64, PayoutRecord)>>,
    idempotency: Mutex<HashMap<(UserId, String), PayoutId>>,
    residuals: Mutex<HashMap<ResidualId, (u64, ResidualRecord)>>,
    /// Referral links keyed by the referred user, with insertion sequence.
    referrals: Mutex<HashMap<UserId, (u64, Referral)>>,
    schema_version: Mutex<u32>,
    faults: Mutex<Faults>,
    sequence: AtomicU64,
    write_attempts: AtomicU64,
}

impl NullStore {
    pub fn new() -> Self {
        Self {
            payouts: Mutex::new(HashMap::new()),
            idempotency: Mutex::new(HashMap::new()),
            residuals: Mutex::new(HashMap::new()),
            referrals: Mutex::new(HashMap::new()),
            schema_version: Mutex::new(0),
            faults: Mutex::new(Faults::default()),
            sequence: AtomicU64::new(0),
            write_attempts: AtomicU64::new(0),
        }
    }

    /// Make the next `count` writes fail with [`StoreError::Unavailable`]
    /// without applying them.
    pub fn fail_next_writes(&self, count: u32) {
        self.faults.lock().unwrap().fail_writes = count;
    }

    /// Make the next `count` writes block for `delay` before applying.
    ///
    /// Delayed writes are served before any injected failures, so a slow
    /// write followed by failing retries can be staged together.
    pub fn delay_next_writes(&self, count: u32, delay: Duration) {
        let mut faults = self.faults.lock().unwrap();
        faults.delayed_writes = count;
        faults.delay = delay;
    }

    /// Number of write calls seen so far, including failed ones.
    pub fn write_attempts(&self) -> u64 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    fn before_write(&self) -> Result<(), StoreError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = {
            let mut faults = self.faults.lock().unwrap();
            if faults.delayed_writes > 0 {
                faults.delayed_writes -= 1;
                Some(faults.delay)
            } else if faults.fail_writes > 0 {
                faults.fail_writes -= 1;
                return Err(StoreError::Unavailable("injected write failure".into()));
            } else {
                None
            }
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        Ok(())
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PayoutStore for NullStore {
    fn insert_payout(&self, record: &PayoutRecord) -> Result<PayoutRecord, StoreError> {
        self.before_write()?;
        let mut payouts = self.payouts.lock().unwrap();
        let mut idempotency = self.idempotency.lock().unwrap();

        if let Some((_, existing)) = payouts.get(&record.id) {
            return Ok(existing.clone());
        }
        let token = record
            .idempotency_key
            .as_ref()
            .map(|key| (record.user_id.clone(), key.as_str().to_string()));
        if let Some(prior) = token.as_ref().and_then(|t| idempotency.get(t)) {
            let (_, existing) = payouts.get(prior).ok_or_else(|| {
                StoreError::Corruption(format!("dangling idempotency entry for {}", record.user_id))
            })?;
            return Ok(existing.clone());
        }

        payouts.insert(record.id, (self.next_sequence(), record.clone()));
        if let Some(token) = token {
            idempotency.insert(token, record.id);
        }
        Ok(record.clone())
    }

    fn get_payout(&self, id: &PayoutId) -> Result<PayoutRecord, StoreError> {
        self.payouts
            .lock()
            .unwrap()
            .get(id)
            .map(|(_, record)| record.clone())
            .ok_or_else(|| StoreError::NotFound(format!("payout {id}")))
    }

    fn payouts_for_user(&self, user: &UserId) -> Result<Vec<PayoutRecord>, StoreError> {
        let payouts = self.payouts.lock().unwrap();
        let mut matching: Vec<_> = payouts
            .values()
            .filter(|(_, record)| &record.user_id == user)
            .collect();
        matching.sort_by(|(seq_a, a), (seq_b, b)| {
            (b.created_at, seq_b).cmp(&(a.created_at, seq_a))
        });
        Ok(matching.into_iter().map(|(_, r)| r.clone()).collect())
    }

    fn update_payout_status(
        &self,
        id: &PayoutId,
        status: PayoutStatus,
    ) -> Result<PayoutRecord, StoreError> {
        self.before_write()?;
        let mut payouts = self.payouts.lock().unwrap();
        let (_, record) = payouts
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("payout {id}")))?;
        check_transition(record, status)?;
        record.status = status;
        Ok(record.clone())
    }

    fn payout_count(&self) -> Result<u64, StoreError> {
        Ok(self.payouts.lock().unwrap().len() as u64)
    }
}

impl ResidualStore for NullStore {
    fn put_residuals(&self, records: &[ResidualRecord]) -> Result<(), StoreError> {
        self.before_write()?;
        let mut residuals = self.residuals.lock().unwrap();
        for record in records {
            let seq = self.next_sequence();
            residuals.entry(record.id).or_insert((seq, record.clone()));
        }
        Ok(())
    }

    fn residuals_for_user(&self, earner: &UserId) -> Result<Vec<ResidualRecord>, StoreError> {
        let residuals = self.residuals.lock().unwrap();
        let mut matching: Vec<_> = residuals
            .values()
            .filter(|(_, record)| &record.earner == earner)
            .collect();
        matching.sort_by_key(|(seq, record)| (record.created_at, *seq));
        Ok(matching.into_iter().map(|(_, r)| r.clone()).collect())
    }
}

impl UplineDirectory for NullStore {
    fn set_referrer(&self, referral: &Referral) -> Result<(), StoreError> {
        self.before_write()?;
        let mut referrals = self.referrals.lock().unwrap();
        if referrals.contains_key(&referral.user) {
            return Err(StoreError::Duplicate(format!("referrer of {}", referral.user)));
        }
        referrals.insert(referral.user.clone(), (self.next_sequence(), referral.clone()));
        Ok(())
    }

    fn referrer_of(&self, user: &UserId) -> Result<Option<UserId>, StoreError> {
        Ok(self
            .referrals
            .lock()
            .unwrap()
            .get(user)
            .map(|(_, referral)| referral.referrer.clone()))
    }

    fn direct_referrals(&self, referrer: &UserId) -> Result<Vec<Referral>, StoreError> {
        let referrals = self.referrals.lock().unwrap();
        let mut matching: Vec<_> = referrals
            .values()
            .filter(|(_, referral)| &referral.referrer == referrer)
            .collect();
        matching.sort_by(|(seq_a, a), (seq_b, b)| {
            (b.enrolled_at, seq_b).cmp(&(a.enrolled_at, seq_a))
        });
        Ok(matching.into_iter().map(|(_, r)| r.clone()).collect())
    }
}

impl MetaStore for NullStore {
    fn get_schema_version(&self) -> Result<u32, StoreError> {
        Ok(*self.schema_version.lock().unwrap())
    }

    fn set_schema_version(&self, version: u32) -> Result<(), StoreError> {
        *self.schema_version.lock().unwrap() = version;
        Ok(())
    }
}
