//! Merge/dedup engine: the only code that mutates a ledger.
use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDateTime;

use crate::error::LedgerError;
use crate::record::{GachaRecord, Ledger, PoolType, Provenance};

/// Merge validated candidate records into a ledger.
///
/// Candidates are grouped by pool; within each pool any record whose `id`
/// already exists is silently skipped, which is what makes the merge
/// idempotent. Surviving records are inserted keeping ascending
/// (time, id) order. Returns the number of records actually inserted.
///
/// Provenance rule: an unset ledger adopts the caller's provenance; a set
/// ledger rejects a differing one before anything is touched. Passing
/// [`Provenance::Unset`] (migration replays) matches any existing value and
/// never overwrites it.
///
/// # Errors
///
/// Returns [`LedgerError::MixedProvider`] on a provenance conflict; the
/// ledger is left untouched.
pub fn merge_records(
    ledger: &mut Ledger,
    candidates: Vec<GachaRecord>,
    provenance: Provenance,
    now: NaiveDateTime,
) -> Result<usize, LedgerError> {
    if provenance != Provenance::Unset {
        match ledger.provenance {
            Provenance::Unset => ledger.provenance = provenance,
            existing if existing != provenance => {
                return Err(LedgerError::MixedProvider {
                    existing,
                    incoming: provenance,
                });
            }
            _ => {}
        }
    }

    let mut grouped: BTreeMap<PoolType, Vec<GachaRecord>> = BTreeMap::new();
    for candidate in candidates {
        grouped.entry(candidate.pool_type).or_default().push(candidate);
    }

    let mut inserted = 0;
    for (pool_type, batch) in grouped {
        let pool = ledger.pools.entry(pool_type).or_default();
        let mut ids: HashSet<String> = pool.iter().map(|record| record.id.clone()).collect();
        let before = pool.len();
        for candidate in batch {
            if !ids.insert(candidate.id.clone()) {
                continue;
            }
            pool.push(candidate);
        }
        if pool.len() > before {
            pool.sort_by(GachaRecord::sort_cmp);
            inserted += pool.len() - before;
        }
    }

    ledger.update_time = now;
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ItemKind, PoolType};
    use chrono::NaiveDate;

    fn at(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 5, 11)
            .unwrap()
            .and_hms_opt(11, minute, 0)
            .unwrap()
    }

    fn record(id: &str, minute: u32, rarity: u8) -> GachaRecord {
        GachaRecord {
            id: id.to_string(),
            name: "希儿".to_string(),
            item_id: "1102".to_string(),
            pool_type: PoolType::Character,
            item_kind: ItemKind::Character,
            rarity,
            time: at(minute),
        }
    }

    #[test]
    fn merge_is_idempotent() {
        let mut ledger = Ledger::new("100000001", at(0));
        let batch = vec![record("3", 3, 3), record("1", 1, 5), record("2", 2, 4)];
        let first = merge_records(&mut ledger, batch.clone(), Provenance::Srgf, at(10)).unwrap();
        assert_eq!(first, 3);
        let before = ledger.clone();
        let second = merge_records(&mut ledger, batch, Provenance::Srgf, at(20)).unwrap();
        assert_eq!(second, 0);
        assert_eq!(ledger.pools, before.pools);
    }

    #[test]
    fn records_are_kept_in_time_order() {
        let mut ledger = Ledger::new("100000001", at(0));
        merge_records(
            &mut ledger,
            vec![record("5", 5, 3), record("1", 1, 3), record("3", 3, 3)],
            Provenance::Native,
            at(10),
        )
        .unwrap();
        let ids: Vec<&str> = ledger
            .pool(PoolType::Character)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, ["1", "3", "5"]);
    }

    #[test]
    fn duplicates_inside_one_batch_count_once() {
        let mut ledger = Ledger::new("100000001", at(0));
        let inserted = merge_records(
            &mut ledger,
            vec![record("1", 1, 5), record("1", 1, 5), record("2", 2, 4)],
            Provenance::Native,
            at(10),
        )
        .unwrap();
        assert_eq!(inserted, 2);
    }

    #[test]
    fn mixed_provenance_is_rejected_untouched() {
        let mut ledger = Ledger::new("100000001", at(0));
        merge_records(&mut ledger, vec![record("1", 1, 5)], Provenance::Native, at(1)).unwrap();
        let before = ledger.clone();
        let result = merge_records(&mut ledger, vec![record("2", 2, 4)], Provenance::Srgf, at(2));
        assert!(matches!(result, Err(LedgerError::MixedProvider { .. })));
        assert_eq!(ledger, before);
    }

    #[test]
    fn unset_incoming_provenance_matches_anything() {
        let mut ledger = Ledger::new("100000001", at(0));
        merge_records(&mut ledger, vec![record("1", 1, 5)], Provenance::Srgf, at(1)).unwrap();
        merge_records(&mut ledger, vec![record("2", 2, 4)], Provenance::Unset, at(2)).unwrap();
        assert_eq!(ledger.provenance, Provenance::Srgf);
        assert_eq!(ledger.total_records(), 2);
    }

    #[test]
    fn ids_stay_distinct_across_pools_independently() {
        let mut ledger = Ledger::new("100000001", at(0));
        let mut cone = record("1", 1, 5);
        cone.pool_type = PoolType::LightCone;
        cone.item_kind = ItemKind::LightCone;
        cone.name = "银河铁道之夜".to_string();
        cone.item_id = "23000".to_string();
        let inserted = merge_records(
            &mut ledger,
            vec![record("1", 1, 5), cone],
            Provenance::Native,
            at(10),
        )
        .unwrap();
        // Dedup is per pool; the same id in two pools is two records.
        assert_eq!(inserted, 2);
    }
}
