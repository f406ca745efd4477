//! Canonical record and ledger types shared by every other module.
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The four warp pools the upstream service exposes.
///
/// Wire tokens ("1", "2", "11", "12") are stable across interchange format
/// versions and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolType {
    Standard,
    Novice,
    Character,
    LightCone,
}

impl PoolType {
    /// All pools in stable iteration order.
    pub const ALL: [Self; 4] = [Self::Standard, Self::Novice, Self::Character, Self::LightCone];

    /// Numeric code used by the upstream service and the interchange format.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Standard => 1,
            Self::Novice => 2,
            Self::Character => 11,
            Self::LightCone => 12,
        }
    }

    /// Stringified pool code as it appears on the wire.
    #[must_use]
    pub const fn wire_token(self) -> &'static str {
        match self {
            Self::Standard => "1",
            Self::Novice => "2",
            Self::Character => "11",
            Self::LightCone => "12",
        }
    }

    /// Parse a wire token back into a pool type.
    #[must_use]
    pub fn from_wire_token(token: &str) -> Option<Self> {
        match token.trim() {
            "1" => Some(Self::Standard),
            "2" => Some(Self::Novice),
            "11" => Some(Self::Character),
            "12" => Some(Self::LightCone),
            _ => None,
        }
    }

    /// Pool label used by the native document's `item_list` keys.
    #[must_use]
    pub const fn native_label(self) -> &'static str {
        match self {
            Self::Standard => "常驻跃迁",
            Self::Novice => "新手跃迁",
            Self::Character => "角色跃迁",
            Self::LightCone => "光锥跃迁",
        }
    }

    /// Parse a native document pool label.
    #[must_use]
    pub fn from_native_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|pool| pool.native_label() == label)
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.native_label())
    }
}

/// What kind of item a record awarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Character,
    LightCone,
}

impl ItemKind {
    /// The two fixed localized labels recognized on the wire.
    #[must_use]
    pub const fn wire_label(self) -> &'static str {
        match self {
            Self::Character => "角色",
            Self::LightCone => "光锥",
        }
    }

    /// Parse a wire label back into a kind.
    #[must_use]
    pub fn from_wire_label(label: &str) -> Option<Self> {
        match label.trim() {
            "角色" => Some(Self::Character),
            "光锥" => Some(Self::LightCone),
            _ => None,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_label())
    }
}

/// Which record source originally populated a ledger.
///
/// Fixed on first write; later merges must declare the same provenance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Records fetched from the upstream service or imported from the
    /// ledger's own legacy export format.
    Native,
    /// Records imported from a standard interchange (SRGF) document.
    Srgf,
    /// Ledger has never been written to.
    #[default]
    Unset,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Native => "native",
            Self::Srgf => "srgf",
            Self::Unset => "unset",
        })
    }
}

/// One validated historical pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GachaRecord {
    /// Server-assigned identifier, unique within a pool; the sole dedup key.
    pub id: String,
    /// Canonical item name as registered in the name registry.
    pub name: String,
    /// Canonical numeric item identifier, stringified for the wire.
    pub item_id: String,
    pub pool_type: PoolType,
    pub item_kind: ItemKind,
    /// 3, 4 or 5.
    pub rarity: u8,
    pub time: NaiveDateTime,
}

impl GachaRecord {
    /// Ordering key within a pool: ascending time, ties broken by id.
    ///
    /// Record ids are decimal strings of varying length, so the tiebreak
    /// compares length before content to preserve numeric order.
    #[must_use]
    pub fn sort_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.id.len().cmp(&other.id.len()))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Storage key for one player's ledger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountKey {
    /// Chat-platform user id, already resolved by the caller.
    pub user_id: i64,
    /// In-game account id. Kept as a string; it travels as one on the wire
    /// and the ledger never does arithmetic on it.
    pub uid: String,
}

impl AccountKey {
    #[must_use]
    pub fn new(user_id: i64, uid: impl Into<String>) -> Self {
        Self {
            user_id,
            uid: uid.into(),
        }
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.uid)
    }
}

/// Durable per-account pull history, one ordered record list per pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub uid: String,
    pub update_time: NaiveDateTime,
    #[serde(default)]
    pub provenance: Provenance,
    /// Time-ascending records per pool. All four pools are always present
    /// so exports enumerate them deterministically.
    pub pools: BTreeMap<PoolType, Vec<GachaRecord>>,
}

impl Ledger {
    /// Create an empty ledger for an account.
    #[must_use]
    pub fn new(uid: impl Into<String>, now: NaiveDateTime) -> Self {
        let mut pools = BTreeMap::new();
        for pool in PoolType::ALL {
            pools.insert(pool, Vec::new());
        }
        Self {
            uid: uid.into(),
            update_time: now,
            provenance: Provenance::Unset,
            pools,
        }
    }

    /// Records for one pool, empty when nothing has been merged yet.
    #[must_use]
    pub fn pool(&self, pool_type: PoolType) -> &[GachaRecord] {
        self.pools.get(&pool_type).map_or(&[], Vec::as_slice)
    }

    /// Total record count across all pools.
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.pools.values().map(Vec::len).sum()
    }

    /// True when no pool holds any record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_records() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_tokens_round_trip() {
        for pool in PoolType::ALL {
            assert_eq!(PoolType::from_wire_token(pool.wire_token()), Some(pool));
            assert_eq!(PoolType::from_native_label(pool.native_label()), Some(pool));
        }
        assert_eq!(PoolType::from_wire_token("3"), None);
        assert_eq!(PoolType::from_native_label("未知跃迁"), None);
    }

    #[test]
    fn item_kind_labels_round_trip() {
        assert_eq!(ItemKind::from_wire_label("角色"), Some(ItemKind::Character));
        assert_eq!(ItemKind::from_wire_label("光锥"), Some(ItemKind::LightCone));
        assert_eq!(ItemKind::from_wire_label("武器"), None);
    }

    #[test]
    fn sort_cmp_orders_by_time_then_numeric_id() {
        let time = NaiveDateTime::parse_from_str("2023-05-01 12:00:00", "%Y-%m-%d %H:%M:%S")
            .unwrap();
        let make = |id: &str| GachaRecord {
            id: id.to_string(),
            name: "希儿".to_string(),
            item_id: "1102".to_string(),
            pool_type: PoolType::Character,
            item_kind: ItemKind::Character,
            rarity: 5,
            time,
        };
        let short = make("999");
        let long = make("1000");
        assert_eq!(short.sort_cmp(&long), std::cmp::Ordering::Less);
    }

    #[test]
    fn new_ledger_has_all_pools() {
        let now = chrono::NaiveDate::from_ymd_opt(2023, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let ledger = Ledger::new("100000001", now);
        assert_eq!(ledger.pools.len(), 4);
        assert!(ledger.is_empty());
        assert_eq!(ledger.provenance, Provenance::Unset);
    }
}
