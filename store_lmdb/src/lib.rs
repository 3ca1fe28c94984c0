//! LMDB storage backend for the y'alls earnings core.
//!
//! Implements the storage traits from `yalls-store` using the `heed` LMDB bindings.
//! All logical stores live in named databases within a single environment.

pub mod environment;
pub mod error;
pub mod keys;
pub mod meta;
pub mod migration;
pub mod payout;
pub mod residual;
pub mod upline;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use meta::LmdbMetaStore;
pub use payout::LmdbPayoutStore;
pub use residual::LmdbResidualStore;
pub use upline::LmdbUplineDirectory;
