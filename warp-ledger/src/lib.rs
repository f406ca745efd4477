//! Warp Ledger
//!
//! Durable, per-account warp (gacha) pull history: authenticated upstream
//! fetch, import/export of the native and SRGF interchange formats,
//! idempotent merge with dedup and provenance guarantees, and pity/luck
//! statistics for display. The chat front-end, template rendering and icon
//! resolution are external collaborators reached through the seams defined
//! here.

pub mod analysis;
pub mod banner;
pub mod codec;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod merge;
pub mod record;
pub mod registry;
pub mod validate;

// Re-export commonly used types
pub use analysis::{
    BannerAnalysis, BannerItemCount, CrossPoolAnalysis, FiveStarPull, FiveStarSummary, PityParams,
    PoolAnalysis, analyze_banner_window, analyze_cross_pool, analyze_pool,
};
pub use banner::{BannerSchedule, BannerWindow};
pub use codec::{
    MAX_IMPORT_BYTES, NativeDocument, RawRecord, SRGF_VERSION, SrgfDocument, SrgfInfo, SrgfItem,
    check_import_size, decode_native, decode_srgf, encode_native, encode_srgf,
};
pub use engine::{LedgerEngine, LockTable, MigrationReport};
pub use error::LedgerError;
pub use fetch::{HttpWarpSource, WarpSource, authkey_from_url};
pub use merge::merge_records;
pub use record::{AccountKey, GachaRecord, ItemKind, Ledger, PoolType, Provenance};
pub use registry::{NameRegistry, ResolvedItem};
pub use validate::{ValidationError, validate, validate_batch};

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Mutex;

/// Trait for abstracting durable ledger persistence.
///
/// The engine treats storage as a keyed blob store; whether that is a
/// filesystem, object store or database is the adapter's business.
pub trait LedgerStorage {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist a ledger under its account key.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be saved.
    fn save(&self, key: &AccountKey, ledger: &Ledger) -> Result<(), Self::Error>;

    /// Load the ledger stored under an account key, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be loaded.
    fn load(&self, key: &AccountKey) -> Result<Option<Ledger>, Self::Error>;

    /// Delete a stored ledger; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete cannot be carried out.
    fn delete(&self, key: &AccountKey) -> Result<bool, Self::Error>;
}

/// In-memory storage for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryStorage {
    ledgers: Mutex<HashMap<AccountKey, Ledger>>,
}

impl LedgerStorage for MemoryStorage {
    type Error = Infallible;

    fn save(&self, key: &AccountKey, ledger: &Ledger) -> Result<(), Self::Error> {
        self.ledgers
            .lock()
            .expect("memory storage poisoned")
            .insert(key.clone(), ledger.clone());
        Ok(())
    }

    fn load(&self, key: &AccountKey) -> Result<Option<Ledger>, Self::Error> {
        Ok(self
            .ledgers
            .lock()
            .expect("memory storage poisoned")
            .get(key)
            .cloned())
    }

    fn delete(&self, key: &AccountKey) -> Result<bool, Self::Error> {
        Ok(self
            .ledgers
            .lock()
            .expect("memory storage poisoned")
            .remove(key)
            .is_some())
    }
}
