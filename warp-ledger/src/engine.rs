//! Ledger engine: wires storage, registry and the per-account lock table
//! into the operations the front-end invokes.
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDateTime};
use log::{debug, info};

use crate::LedgerStorage;
use crate::analysis::{
    BannerAnalysis, CrossPoolAnalysis, PityParams, PoolAnalysis, analyze_banner_window,
    analyze_cross_pool, analyze_pool,
};
use crate::banner::BannerWindow;
use crate::codec::{
    NativeDocument, SrgfDocument, check_import_size, decode_native, decode_srgf, encode_native,
    encode_srgf,
};
use crate::error::LedgerError;
use crate::fetch::WarpSource;
use crate::merge::merge_records;
use crate::record::{AccountKey, GachaRecord, Ledger, PoolType, Provenance};
use crate::registry::NameRegistry;
use crate::validate::validate_batch;

/// Process-wide table of per-account locks.
///
/// Entries are created lazily and garbage-collected whenever the table is
/// consulted and nobody else holds the entry; they carry no state beyond
/// mutual exclusion. Lock poisoning is an internal invariant violation and
/// panics rather than surfacing as a user error.
#[derive(Default)]
pub struct LockTable {
    inner: Mutex<HashMap<AccountKey, Arc<Mutex<()>>>>,
}

impl LockTable {
    /// Handle for one account's lock; callers lock the returned mutex for
    /// the duration of their critical section.
    #[must_use]
    pub fn handle(&self, key: &AccountKey) -> Arc<Mutex<()>> {
        let mut table = self.inner.lock().expect("lock table poisoned");
        table.retain(|_, lock| Arc::strong_count(lock) > 1);
        table.entry(key.clone()).or_default().clone()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().expect("lock table poisoned").len()
    }
}

/// Per-uid outcome of a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Records actually moved per uid. Uids with no old ledger are absent.
    pub moved: BTreeMap<String, usize>,
}

impl MigrationReport {
    /// Total records moved across all uids.
    #[must_use]
    pub fn total_moved(&self) -> usize {
        self.moved.values().sum()
    }
}

/// The only mutator of ledgers in the system.
///
/// Every write path (fetch-merge, import-merge, migration) holds the
/// account's exclusive lock for the whole load, merge, persist sequence;
/// reads take the same lock briefly to avoid observing a mid-merge ledger.
pub struct LedgerEngine<S> {
    storage: S,
    registry: NameRegistry,
    locks: LockTable,
    export_app: String,
    export_app_version: String,
}

impl<S> LedgerEngine<S>
where
    S: LedgerStorage,
    S::Error: Into<anyhow::Error>,
{
    /// Create an engine over a storage adapter and a name registry.
    pub fn new(storage: S, registry: NameRegistry) -> Self {
        Self {
            storage,
            registry,
            locks: LockTable::default(),
            export_app: env!("CARGO_PKG_NAME").to_string(),
            export_app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Override the application identity stamped on SRGF exports.
    #[must_use]
    pub fn with_export_app(mut self, app: impl Into<String>, version: impl Into<String>) -> Self {
        self.export_app = app.into();
        self.export_app_version = version.into();
        self
    }

    fn now() -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn load(&self, key: &AccountKey) -> Result<Option<Ledger>, LedgerError> {
        self.storage
            .load(key)
            .map_err(|err| LedgerError::Storage(err.into()))
    }

    fn require(&self, key: &AccountKey) -> Result<Ledger, LedgerError> {
        match self.load(key)? {
            Some(ledger) if !ledger.is_empty() => Ok(ledger),
            _ => Err(LedgerError::NotFound),
        }
    }

    fn save(&self, key: &AccountKey, ledger: &Ledger) -> Result<(), LedgerError> {
        self.storage
            .save(key, ledger)
            .map_err(|err| LedgerError::Storage(err.into()))
    }

    fn merge_into_account(
        &self,
        key: &AccountKey,
        records: Vec<GachaRecord>,
        provenance: Provenance,
    ) -> Result<usize, LedgerError> {
        let handle = self.locks.handle(key);
        let _guard = handle.lock().expect("account lock poisoned");
        let now = Self::now();
        let mut ledger = self
            .load(key)?
            .unwrap_or_else(|| Ledger::new(key.uid.clone(), now));
        let inserted = merge_records(&mut ledger, records, provenance, now)?;
        self.save(key, &ledger)?;
        info!("merged {inserted} new records into {key} ({provenance})");
        Ok(inserted)
    }

    /// Import an SRGF interchange document.
    ///
    /// `verify_uid` should be true for any document that embeds a real uid;
    /// the opt-out exists only for legacy exports that never carried one.
    ///
    /// # Errors
    ///
    /// Size, format, version, uid-mismatch, per-record validation and
    /// provenance failures per the taxonomy; the ledger is untouched on any
    /// of them.
    pub fn import_srgf(
        &self,
        user_id: i64,
        uid: &str,
        bytes: &[u8],
        verify_uid: bool,
    ) -> Result<usize, LedgerError> {
        check_import_size(bytes)?;
        let document = decode_srgf(bytes)?;
        if verify_uid && !is_placeholder_uid(&document.info.uid) && document.info.uid != uid {
            return Err(LedgerError::AccountMismatch {
                expected: uid.to_string(),
                found: document.info.uid,
            });
        }
        let records = validate_batch(&document.records(), &self.registry)?;
        debug!("srgf import for uid {uid}: {} candidate records", records.len());
        self.merge_into_account(&AccountKey::new(user_id, uid), records, Provenance::Srgf)
    }

    /// Import a native document (the ledger's own export format).
    ///
    /// # Errors
    ///
    /// Same failure taxonomy as [`Self::import_srgf`].
    pub fn import_native(
        &self,
        user_id: i64,
        uid: &str,
        bytes: &[u8],
    ) -> Result<usize, LedgerError> {
        check_import_size(bytes)?;
        let document = decode_native(bytes)?;
        if !is_placeholder_uid(&document.uid) && document.uid != uid {
            return Err(LedgerError::AccountMismatch {
                expected: uid.to_string(),
                found: document.uid,
            });
        }
        let records = validate_batch(&document.records(), &self.registry)?;
        self.merge_into_account(&AccountKey::new(user_id, uid), records, Provenance::Native)
    }

    /// Fetch fresh history from the upstream service and merge it.
    ///
    /// # Errors
    ///
    /// Authkey and transient-fetch errors from the source, plus the merge
    /// taxonomy. Abandoning the call before the merge starts has no side
    /// effects; once merging, it runs to completion.
    pub fn refresh_from_source(
        &self,
        user_id: i64,
        uid: &str,
        authkey: &str,
        source: &impl WarpSource,
    ) -> Result<usize, LedgerError> {
        let raw = source.fetch(uid, authkey)?;
        info!("fetched {} raw records for uid {uid}", raw.len());
        let records = validate_batch(&raw, &self.registry)?;
        self.merge_into_account(&AccountKey::new(user_id, uid), records, Provenance::Native)
    }

    /// Whether any records are stored for the account.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    pub fn has_history(&self, user_id: i64, uid: &str) -> Result<bool, LedgerError> {
        Ok(self
            .load(&AccountKey::new(user_id, uid))?
            .is_some_and(|ledger| !ledger.is_empty()))
    }

    /// Export the account's ledger as a fresh SRGF document.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] when nothing has been imported.
    pub fn export_srgf(&self, user_id: i64, uid: &str) -> Result<SrgfDocument, LedgerError> {
        let key = AccountKey::new(user_id, uid);
        let handle = self.locks.handle(&key);
        let _guard = handle.lock().expect("account lock poisoned");
        let ledger = self.require(&key)?;
        Ok(encode_srgf(
            &ledger,
            &self.export_app,
            &self.export_app_version,
            Self::now(),
        ))
    }

    /// Export the account's ledger in the native document shape.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] when nothing has been imported.
    pub fn export_native(&self, user_id: i64, uid: &str) -> Result<NativeDocument, LedgerError> {
        let key = AccountKey::new(user_id, uid);
        let handle = self.locks.handle(&key);
        let _guard = handle.lock().expect("account lock poisoned");
        let ledger = self.require(&key)?;
        Ok(encode_native(&ledger, user_id))
    }

    /// Hard-delete the account's ledger. Irreversible.
    ///
    /// # Errors
    ///
    /// Storage failures only; deleting a missing ledger returns `false`.
    pub fn delete(&self, user_id: i64, uid: &str) -> Result<bool, LedgerError> {
        let key = AccountKey::new(user_id, uid);
        let handle = self.locks.handle(&key);
        let _guard = handle.lock().expect("account lock poisoned");
        let deleted = self
            .storage
            .delete(&key)
            .map_err(|err| LedgerError::Storage(err.into()))?;
        if deleted {
            info!("deleted warp history for {key}");
        }
        Ok(deleted)
    }

    /// Pity statistics for one pool.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] when the pool holds no records.
    pub fn analyze_pool(
        &self,
        user_id: i64,
        uid: &str,
        pool_type: PoolType,
        params: PityParams,
    ) -> Result<PoolAnalysis, LedgerError> {
        let key = AccountKey::new(user_id, uid);
        let handle = self.locks.handle(&key);
        let _guard = handle.lock().expect("account lock poisoned");
        let ledger = self.require(&key)?;
        analyze_pool(&ledger, pool_type, params)
    }

    /// Statistics restricted to one banner window.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] when the pool holds no records.
    pub fn analyze_banner_window(
        &self,
        user_id: i64,
        uid: &str,
        pool_type: PoolType,
        window: &BannerWindow,
    ) -> Result<BannerAnalysis, LedgerError> {
        let key = AccountKey::new(user_id, uid);
        let handle = self.locks.handle(&key);
        let _guard = handle.lock().expect("account lock poisoned");
        let ledger = self.require(&key)?;
        analyze_banner_window(&ledger, pool_type, window)
    }

    /// Account-wide 5★ statistics across every pool.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an empty ledger.
    pub fn analyze_cross_pool(
        &self,
        user_id: i64,
        uid: &str,
    ) -> Result<CrossPoolAnalysis, LedgerError> {
        let key = AccountKey::new(user_id, uid);
        let handle = self.locks.handle(&key);
        let _guard = handle.lock().expect("account lock poisoned");
        let ledger = self.require(&key)?;
        analyze_cross_pool(&ledger)
    }

    /// Re-key ledgers from one user id to another, merging into whatever the
    /// new key already holds and deleting each old key after its records
    /// land. Safe to re-run after a partial failure: merging is idempotent
    /// and missing old keys are skipped.
    ///
    /// # Errors
    ///
    /// Storage failures and provenance conflicts abort the run; uids already
    /// migrated stay migrated.
    pub fn migrate(
        &self,
        old_user_id: i64,
        new_user_id: i64,
        uids: &[String],
    ) -> Result<MigrationReport, LedgerError> {
        if old_user_id == new_user_id {
            return Ok(MigrationReport::default());
        }
        let mut report = MigrationReport::default();
        for uid in uids {
            let old_key = AccountKey::new(old_user_id, uid.clone());
            let new_key = AccountKey::new(new_user_id, uid.clone());

            // Deterministic acquisition order so two concurrent migrations
            // touching the same accounts cannot deadlock.
            let (first, second) = if old_key <= new_key {
                (old_key.clone(), new_key.clone())
            } else {
                (new_key.clone(), old_key.clone())
            };
            let first_handle = self.locks.handle(&first);
            let _first_guard = first_handle.lock().expect("account lock poisoned");
            let second_handle = self.locks.handle(&second);
            let _second_guard = second_handle.lock().expect("account lock poisoned");

            let Some(old_ledger) = self.load(&old_key)? else {
                debug!("migration: no ledger under {old_key}, skipping");
                continue;
            };
            let now = Self::now();
            let mut new_ledger = self
                .load(&new_key)?
                .unwrap_or_else(|| Ledger::new(uid.clone(), now));
            let records: Vec<_> = old_ledger.pools.values().flatten().cloned().collect();
            let moved = merge_records(&mut new_ledger, records, old_ledger.provenance, now)?;
            self.save(&new_key, &new_ledger)?;
            self.storage
                .delete(&old_key)
                .map_err(|err| LedgerError::Storage(err.into()))?;
            info!("migrated {moved} records from {old_key} to {new_key}");
            report.moved.insert(uid.clone(), moved);
        }
        Ok(report)
    }

    /// The registry this engine validates against.
    #[must_use]
    pub fn registry(&self) -> &NameRegistry {
        &self.registry
    }
}

/// "0" and the empty string mean "no uid recorded" in interchange documents.
fn is_placeholder_uid(uid: &str) -> bool {
    uid.is_empty() || uid == "0"
}
