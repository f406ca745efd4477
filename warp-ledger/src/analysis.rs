//! Read-only pity and luck statistics over a stored ledger.
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::banner::BannerWindow;
use crate::error::LedgerError;
use crate::record::{GachaRecord, Ledger, PoolType};

/// Pity gaps for one item, kept inline for the common one-or-two-copies case.
pub type GapList = SmallVec<[u32; 4]>;

/// Named analysis parameters.
///
/// The hard-pity ceiling and the luck weighting are display/tuning concerns,
/// not ledger invariants, so they are explicit parameters rather than hidden
/// constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PityParams {
    /// Guaranteed-5★ ceiling for the pool being analyzed.
    pub hard_pity: u32,
}

impl PityParams {
    /// Conventional ceilings: 80 pulls on the light-cone pool, 90 elsewhere.
    #[must_use]
    pub const fn for_pool(pool_type: PoolType) -> Self {
        let hard_pity = match pool_type {
            PoolType::LightCone => 80,
            _ => 90,
        };
        Self { hard_pity }
    }

    /// Luck score in `[0, 100]`: `clamp01(1 - avg_gap / hard_pity) * 100`.
    ///
    /// 100 means every 5★ arrived instantly, 0 means the average gap met or
    /// exceeded the ceiling.
    #[must_use]
    pub fn luck_score(&self, average_gap: f64) -> f64 {
        if self.hard_pity == 0 {
            return 0.0;
        }
        (1.0 - average_gap / f64::from(self.hard_pity)).clamp(0.0, 1.0) * 100.0
    }
}

/// One 5★ pull with the pity it resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiveStarPull {
    pub name: String,
    pub item_id: String,
    pub time: NaiveDateTime,
    /// Pulls since the previous 5★, inclusive of this one.
    pub pity: u32,
    /// Pool the pull came from; interesting for the cross-pool view.
    pub pool_type: PoolType,
}

/// Aggregate per distinct 5★ name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiveStarSummary {
    pub name: String,
    pub item_id: String,
    pub count: u32,
    /// Pity gap of each occurrence, in pull order.
    pub gaps: GapList,
}

/// Full statistics for one pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolAnalysis {
    pub pool_type: PoolType,
    pub params: PityParams,
    pub total_pulls: u32,
    pub five_star_count: u32,
    pub four_star_count: u32,
    /// Chronological 5★ pulls with their gaps.
    pub five_stars: Vec<FiveStarPull>,
    /// Per-name aggregates, ordered by first appearance.
    pub per_item: Vec<FiveStarSummary>,
    /// Pulls since the most recent 5★ (current pity).
    pub pity_since_last: u32,
    pub min_gap: Option<u32>,
    pub max_gap: Option<u32>,
    pub average_gap: Option<f64>,
    pub luck_score: Option<f64>,
}

/// Per-item tallies for one banner window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerItemCount {
    pub name: String,
    pub rarity: u8,
    pub count: u32,
}

/// Statistics restricted to one run of a themed banner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerAnalysis {
    pub window_name: String,
    pub pool_type: PoolType,
    pub total_pulls: u32,
    /// 5★ and 4★ tallies, highest rarity first, then by count.
    pub items: Vec<BannerItemCount>,
    pub first_pull_time: Option<NaiveDateTime>,
    pub last_pull_time: Option<NaiveDateTime>,
}

/// Account-wide 5★ picture across every pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossPoolAnalysis {
    pub total_pulls: u32,
    pub five_star_count: u32,
    /// Time-ordered 5★ pulls tagged with their origin pool; pity gaps are
    /// recomputed over the unioned sequence.
    pub five_stars: Vec<FiveStarPull>,
    pub average_gap: Option<f64>,
}

fn gap_walk(records: &[&GachaRecord]) -> (Vec<FiveStarPull>, u32, u32) {
    let mut five_stars = Vec::new();
    let mut counter = 0u32;
    let mut four_star_count = 0u32;
    for record in records {
        counter += 1;
        if record.rarity == 4 {
            four_star_count += 1;
        }
        if record.rarity == 5 {
            five_stars.push(FiveStarPull {
                name: record.name.clone(),
                item_id: record.item_id.clone(),
                time: record.time,
                pity: counter,
                pool_type: record.pool_type,
            });
            counter = 0;
        }
    }
    (five_stars, counter, four_star_count)
}

fn summarize(five_stars: &[FiveStarPull]) -> Vec<FiveStarSummary> {
    let mut per_item: Vec<FiveStarSummary> = Vec::new();
    for pull in five_stars {
        if let Some(entry) = per_item.iter_mut().find(|entry| entry.name == pull.name) {
            entry.count += 1;
            entry.gaps.push(pull.pity);
        } else {
            per_item.push(FiveStarSummary {
                name: pull.name.clone(),
                item_id: pull.item_id.clone(),
                count: 1,
                gaps: GapList::from_slice(&[pull.pity]),
            });
        }
    }
    per_item
}

fn gap_stats(five_stars: &[FiveStarPull]) -> (Option<u32>, Option<u32>, Option<f64>) {
    if five_stars.is_empty() {
        return (None, None, None);
    }
    let min = five_stars.iter().map(|pull| pull.pity).min();
    let max = five_stars.iter().map(|pull| pull.pity).max();
    let sum: u32 = five_stars.iter().map(|pull| pull.pity).sum();
    #[allow(clippy::cast_precision_loss)]
    let average = Some(f64::from(sum) / five_stars.len() as f64);
    (min, max, average)
}

/// Analyze one pool's full history.
///
/// # Errors
///
/// Returns [`LedgerError::NotFound`] when the pool holds no records, so the
/// caller can prompt the user to import first.
pub fn analyze_pool(
    ledger: &Ledger,
    pool_type: PoolType,
    params: PityParams,
) -> Result<PoolAnalysis, LedgerError> {
    let records = ledger.pool(pool_type);
    if records.is_empty() {
        return Err(LedgerError::NotFound);
    }
    let refs: Vec<&GachaRecord> = records.iter().collect();
    let (five_stars, pity_since_last, four_star_count) = gap_walk(&refs);
    let (min_gap, max_gap, average_gap) = gap_stats(&five_stars);
    let luck_score = average_gap.map(|average| params.luck_score(average));
    Ok(PoolAnalysis {
        pool_type,
        params,
        total_pulls: u32::try_from(records.len()).unwrap_or(u32::MAX),
        five_star_count: u32::try_from(five_stars.len()).unwrap_or(u32::MAX),
        four_star_count,
        per_item: summarize(&five_stars),
        five_stars,
        pity_since_last,
        min_gap,
        max_gap,
        average_gap,
        luck_score,
    })
}

/// Analyze the records of one pool that fall inside `[window.from_time,
/// window.to_time)`, attributing pulls to one specific banner run.
///
/// # Errors
///
/// Returns [`LedgerError::NotFound`] when the pool holds no records at all.
/// An empty window over a non-empty pool is a valid, zeroed result.
pub fn analyze_banner_window(
    ledger: &Ledger,
    pool_type: PoolType,
    window: &BannerWindow,
) -> Result<BannerAnalysis, LedgerError> {
    let records = ledger.pool(pool_type);
    if records.is_empty() {
        return Err(LedgerError::NotFound);
    }

    let mut items: Vec<BannerItemCount> = Vec::new();
    let mut total = 0u32;
    let mut first = None;
    let mut last = None;
    for record in records {
        if !window.contains(record.time) {
            continue;
        }
        total += 1;
        if first.is_none() {
            first = Some(record.time);
        }
        last = Some(record.time);
        if record.rarity < 4 {
            continue;
        }
        if let Some(entry) = items
            .iter_mut()
            .find(|entry| entry.name == record.name && entry.rarity == record.rarity)
        {
            entry.count += 1;
        } else {
            items.push(BannerItemCount {
                name: record.name.clone(),
                rarity: record.rarity,
                count: 1,
            });
        }
    }
    items.sort_by(|a, b| b.rarity.cmp(&a.rarity).then(b.count.cmp(&a.count)));

    Ok(BannerAnalysis {
        window_name: window.name.clone(),
        pool_type,
        total_pulls: total,
        items,
        first_pull_time: first,
        last_pull_time: last,
    })
}

/// Union every pool's records into one time-ordered sequence and rerun the
/// pity walk, tagging each 5★ with its origin pool.
///
/// # Errors
///
/// Returns [`LedgerError::NotFound`] for an empty ledger.
pub fn analyze_cross_pool(ledger: &Ledger) -> Result<CrossPoolAnalysis, LedgerError> {
    let mut refs: Vec<&GachaRecord> = ledger.pools.values().flatten().collect();
    if refs.is_empty() {
        return Err(LedgerError::NotFound);
    }
    refs.sort_by(|a, b| a.sort_cmp(b));
    let (five_stars, _, _) = gap_walk(&refs);
    let (_, _, average_gap) = gap_stats(&five_stars);
    Ok(CrossPoolAnalysis {
        total_pulls: u32::try_from(refs.len()).unwrap_or(u32::MAX),
        five_star_count: u32::try_from(five_stars.len()).unwrap_or(u32::MAX),
        five_stars,
        average_gap,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ItemKind, Provenance};
    use chrono::NaiveDate;

    fn at(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 5, 11)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
            + chrono::Duration::minutes(i64::from(minute))
    }

    fn record(id: u32, pool_type: PoolType, rarity: u8) -> GachaRecord {
        GachaRecord {
            id: format!("{:04}", id),
            name: if rarity == 5 { "希儿".to_string() } else { "佩拉".to_string() },
            item_id: if rarity == 5 { "1102".to_string() } else { "1106".to_string() },
            pool_type,
            item_kind: ItemKind::Character,
            rarity,
            time: at(id),
        }
    }

    fn ledger_with(records: Vec<GachaRecord>) -> Ledger {
        let mut ledger = Ledger::new("100000001", at(0));
        ledger.provenance = Provenance::Native;
        for rec in records {
            ledger.pools.entry(rec.pool_type).or_default().push(rec);
        }
        ledger
    }

    fn sequence(five_star_positions: &[u32], len: u32) -> Vec<GachaRecord> {
        (1..=len)
            .map(|i| {
                let rarity = if five_star_positions.contains(&i) { 5 } else { 3 };
                record(i, PoolType::Character, rarity)
            })
            .collect()
    }

    #[test]
    fn pity_gaps_match_pull_indices() {
        // 5★s at 1-indexed positions 12 and 73 -> gaps [12, 61].
        let ledger = ledger_with(sequence(&[12, 73], 80));
        let analysis =
            analyze_pool(&ledger, PoolType::Character, PityParams::for_pool(PoolType::Character))
                .unwrap();
        let gaps: Vec<u32> = analysis.five_stars.iter().map(|p| p.pity).collect();
        assert_eq!(gaps, [12, 61]);
        assert_eq!(analysis.pity_since_last, 7);
        assert_eq!(analysis.total_pulls, 80);
        assert_eq!(analysis.five_star_count, 2);
        assert_eq!(analysis.min_gap, Some(12));
        assert_eq!(analysis.max_gap, Some(61));
        let average = analysis.average_gap.unwrap();
        assert!((average - 36.5).abs() < f64::EPSILON);
    }

    #[test]
    fn luck_score_is_the_documented_formula() {
        let params = PityParams { hard_pity: 90 };
        assert!((params.luck_score(45.0) - 50.0).abs() < f64::EPSILON);
        assert!((params.luck_score(90.0)).abs() < f64::EPSILON);
        assert!((params.luck_score(200.0)).abs() < f64::EPSILON);
        assert!((params.luck_score(0.0) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn per_item_summary_groups_by_name() {
        let ledger = ledger_with(sequence(&[5, 9], 10));
        let analysis =
            analyze_pool(&ledger, PoolType::Character, PityParams { hard_pity: 90 }).unwrap();
        assert_eq!(analysis.per_item.len(), 1);
        assert_eq!(analysis.per_item[0].name, "希儿");
        assert_eq!(analysis.per_item[0].count, 2);
        assert_eq!(analysis.per_item[0].gaps.as_slice(), [5, 4]);
    }

    #[test]
    fn empty_pool_is_not_found() {
        let ledger = ledger_with(sequence(&[], 3));
        assert!(matches!(
            analyze_pool(&ledger, PoolType::LightCone, PityParams { hard_pity: 80 }),
            Err(LedgerError::NotFound)
        ));
    }

    #[test]
    fn banner_window_is_closed_open() {
        let ledger = ledger_with(sequence(&[2], 5));
        let window = BannerWindow {
            name: "测试卡池".to_string(),
            five: vec!["希儿".to_string()],
            four: vec![],
            from_time: at(2),
            to_time: at(4),
        };
        let analysis = analyze_banner_window(&ledger, PoolType::Character, &window).unwrap();
        // Pulls at minutes 2 and 3 fall inside [2, 4); minute 4 does not.
        assert_eq!(analysis.total_pulls, 2);
        assert_eq!(analysis.first_pull_time, Some(at(2)));
        assert_eq!(analysis.last_pull_time, Some(at(3)));
        assert_eq!(analysis.items.len(), 1);
        assert_eq!(analysis.items[0].rarity, 5);
    }

    #[test]
    fn cross_pool_walk_spans_pools_in_time_order() {
        let mut records = sequence(&[2], 3);
        let mut cone = record(10, PoolType::LightCone, 5);
        cone.name = "银河铁道之夜".to_string();
        cone.item_id = "23000".to_string();
        cone.item_kind = ItemKind::LightCone;
        records.push(cone);
        let ledger = ledger_with(records);

        let analysis = analyze_cross_pool(&ledger).unwrap();
        assert_eq!(analysis.total_pulls, 4);
        assert_eq!(analysis.five_star_count, 2);
        assert_eq!(analysis.five_stars[0].pool_type, PoolType::Character);
        assert_eq!(analysis.five_stars[0].pity, 2);
        // One 3★ pull after the first 5★, then the light-cone 5★.
        assert_eq!(analysis.five_stars[1].pool_type, PoolType::LightCone);
        assert_eq!(analysis.five_stars[1].pity, 2);
    }
}
