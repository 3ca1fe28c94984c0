//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::migration::Migrator;
use crate::{
    LmdbError, LmdbMetaStore, LmdbPayoutStore, LmdbResidualStore, LmdbUplineDirectory,
};

/// Number of named databases the environment creates.
pub const DATABASE_COUNT: u32 = 7;

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    env: Arc<Env>,
    payouts_db: Database<Bytes, Bytes>,
    payouts_by_user_db: Database<Bytes, Bytes>,
    idempotency_db: Database<Bytes, Bytes>,
    residuals_db: Database<Bytes, Bytes>,
    referrers_db: Database<Bytes, Bytes>,
    referrals_db: Database<Bytes, Bytes>,
    meta_db: Database<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path and bring its
    /// schema up to date.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment is opened once per path by this process and
        // the map is never modified outside of heed transactions.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(DATABASE_COUNT)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let payouts_db = env.create_database(&mut wtxn, Some("payouts"))?;
        let payouts_by_user_db = env.create_database(&mut wtxn, Some("payouts_by_user"))?;
        let idempotency_db = env.create_database(&mut wtxn, Some("idempotency"))?;
        let residuals_db = env.create_database(&mut wtxn, Some("residuals"))?;
        let referrers_db = env.create_database(&mut wtxn, Some("referrers"))?;
        let referrals_db = env.create_database(&mut wtxn, Some("referrals"))?;
        let meta_db = env.create_database(&mut wtxn, Some("meta"))?;
        wtxn.commit()?;

        let this = Self {
            env: Arc::new(env),
            payouts_db,
            payouts_by_user_db,
            idempotency_db,
            residuals_db,
            referrers_db,
            referrals_db,
            meta_db,
        };

        Migrator::run(&this.meta_store())?;
        tracing::info!(path = %path.display(), map_size, "opened LMDB environment");
        Ok(this)
    }

    pub fn payout_store(&self) -> LmdbPayoutStore {
        LmdbPayoutStore {
            env: Arc::clone(&self.env),
            payouts_db: self.payouts_db,
            payouts_by_user_db: self.payouts_by_user_db,
            idempotency_db: self.idempotency_db,
        }
    }

    pub fn residual_store(&self) -> LmdbResidualStore {
        LmdbResidualStore {
            env: Arc::clone(&self.env),
            residuals_db: self.residuals_db,
        }
    }

    pub fn upline_directory(&self) -> LmdbUplineDirectory {
        LmdbUplineDirectory {
            env: Arc::clone(&self.env),
            referrers_db: self.referrers_db,
            referrals_db: self.referrals_db,
        }
    }

    pub fn meta_store(&self) -> LmdbMetaStore {
        LmdbMetaStore {
            env: Arc::clone(&self.env),
            meta_db: self.meta_db,
        }
    }
}
