//! Normalizes one raw wire record into a canonical [`GachaRecord`].
use thiserror::Error;

use crate::codec::{RawRecord, parse_wire_time};
use crate::record::{GachaRecord, ItemKind, PoolType};
use crate::registry::NameRegistry;

/// Why a single record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("record has no id")]
    MissingId,
    #[error("unknown item name {name:?}")]
    UnknownItem { name: String },
    #[error("{name:?} appears in source data but is not a pullable item")]
    NotRollable { name: String },
    #[error("{name:?} is registered as {registered} but the record declares {declared:?}")]
    KindMismatch {
        name: String,
        declared: String,
        registered: ItemKind,
    },
    #[error("unknown item kind label {label:?}")]
    UnknownItemKind { label: String },
    #[error("unknown pool type token {token:?}")]
    UnknownPoolType { token: String },
    #[error("rarity {token:?} is not 3, 4 or 5")]
    InvalidRarity { token: String },
    #[error("timestamp {value:?} does not parse")]
    InvalidTime { value: String },
}

/// Validate one raw record against the registry.
///
/// Checks run in a fixed order: id, name resolution and rollability, kind
/// agreement, pool token, rarity, timestamp.
///
/// # Errors
///
/// Returns the first failed check as a [`ValidationError`].
pub fn validate(raw: &RawRecord, registry: &NameRegistry) -> Result<GachaRecord, ValidationError> {
    if raw.id.trim().is_empty() {
        return Err(ValidationError::MissingId);
    }

    let resolved = registry
        .resolve(&raw.name)
        .ok_or_else(|| ValidationError::UnknownItem {
            name: raw.name.clone(),
        })?;
    if !registry.is_rollable(resolved.item_id) {
        return Err(ValidationError::NotRollable {
            name: resolved.name,
        });
    }

    let declared_kind = ItemKind::from_wire_label(&raw.item_type).ok_or_else(|| {
        ValidationError::UnknownItemKind {
            label: raw.item_type.clone(),
        }
    })?;
    if declared_kind != resolved.kind {
        return Err(ValidationError::KindMismatch {
            name: resolved.name,
            declared: raw.item_type.clone(),
            registered: resolved.kind,
        });
    }

    let pool_type = PoolType::from_wire_token(&raw.gacha_type).ok_or_else(|| {
        ValidationError::UnknownPoolType {
            token: raw.gacha_type.clone(),
        }
    })?;

    let rarity = match raw.rank_type.trim() {
        "3" => 3,
        "4" => 4,
        "5" => 5,
        _ => {
            return Err(ValidationError::InvalidRarity {
                token: raw.rank_type.clone(),
            });
        }
    };

    let time = parse_wire_time(&raw.time).ok_or_else(|| ValidationError::InvalidTime {
        value: raw.time.clone(),
    })?;

    Ok(GachaRecord {
        id: raw.id.trim().to_string(),
        name: resolved.name,
        item_id: resolved.item_id.to_string(),
        pool_type,
        item_kind: declared_kind,
        rarity,
        time,
    })
}

/// Validate a whole batch, aborting on the first failure.
///
/// A partial ledger is worse than a rejected import: pity computation needs
/// a gap-free sequence, so nothing is silently dropped.
///
/// # Errors
///
/// Returns the first record's [`ValidationError`]; no records from a failing
/// batch should be merged.
pub fn validate_batch(
    raws: &[RawRecord],
    registry: &NameRegistry,
) -> Result<Vec<GachaRecord>, ValidationError> {
    raws.iter().map(|raw| validate(raw, registry)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, item_type: &str) -> RawRecord {
        RawRecord {
            id: "1683774000000000001".to_string(),
            name: name.to_string(),
            gacha_id: String::new(),
            gacha_type: "11".to_string(),
            item_id: String::new(),
            item_type: item_type.to_string(),
            rank_type: "5".to_string(),
            time: "2023-05-11 11:00:00".to_string(),
        }
    }

    #[test]
    fn valid_record_is_canonicalized() {
        let registry = NameRegistry::builtin();
        let record = validate(&raw("seele", "角色"), &registry).unwrap();
        assert_eq!(record.name, "希儿");
        assert_eq!(record.item_id, "1102");
        assert_eq!(record.pool_type, PoolType::Character);
        assert_eq!(record.rarity, 5);
    }

    #[test]
    fn empty_id_is_rejected_first() {
        let registry = NameRegistry::builtin();
        let mut record = raw("不存在的名字", "角色");
        record.id = "  ".to_string();
        assert_eq!(
            validate(&record, &registry),
            Err(ValidationError::MissingId)
        );
    }

    #[test]
    fn unknown_and_non_rollable_names_are_distinguished() {
        let registry = NameRegistry::builtin();
        assert!(matches!(
            validate(&raw("不存在的名字", "角色"), &registry),
            Err(ValidationError::UnknownItem { .. })
        ));
        assert!(matches!(
            validate(&raw("花火", "角色"), &registry),
            Err(ValidationError::NotRollable { .. })
        ));
    }

    #[test]
    fn declared_kind_must_agree_with_registry() {
        let registry = NameRegistry::builtin();
        assert!(matches!(
            validate(&raw("希儿", "光锥"), &registry),
            Err(ValidationError::KindMismatch { .. })
        ));
        assert!(matches!(
            validate(&raw("希儿", "武器"), &registry),
            Err(ValidationError::UnknownItemKind { .. })
        ));
    }

    #[test]
    fn pool_rarity_and_time_are_checked() {
        let registry = NameRegistry::builtin();

        let mut bad_pool = raw("希儿", "角色");
        bad_pool.gacha_type = "3".to_string();
        assert!(matches!(
            validate(&bad_pool, &registry),
            Err(ValidationError::UnknownPoolType { .. })
        ));

        let mut bad_rarity = raw("希儿", "角色");
        bad_rarity.rank_type = "6".to_string();
        assert!(matches!(
            validate(&bad_rarity, &registry),
            Err(ValidationError::InvalidRarity { .. })
        ));

        let mut bad_time = raw("希儿", "角色");
        bad_time.time = "last tuesday".to_string();
        assert!(matches!(
            validate(&bad_time, &registry),
            Err(ValidationError::InvalidTime { .. })
        ));
    }

    #[test]
    fn batch_aborts_on_first_failure() {
        let registry = NameRegistry::builtin();
        let records = vec![raw("希儿", "角色"), raw("不存在的名字", "角色")];
        assert!(validate_batch(&records, &registry).is_err());
    }
}
