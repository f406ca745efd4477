//! Wire formats: the native document and the SRGF interchange document.
//!
//! Both formats decode to the same [`RawRecord`] shape before validation;
//! they differ only in field naming and enum representation. The encoder
//! stamps fresh export metadata and the current [`SRGF_VERSION`].
use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{GachaRecord, Ledger, PoolType, Provenance};
use crate::validate::ValidationError;

/// Interchange format version stamped on exports. Importers accept any
/// document sharing the same major version.
pub const SRGF_VERSION: &str = "v1.0";

/// Import documents larger than this are rejected before decoding.
pub const MAX_IMPORT_BYTES: usize = 5 * 1024 * 1024;

/// Timestamp format used by both wire formats.
pub const WIRE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a wire timestamp, accepting the canonical space-separated form and
/// the ISO-8601 'T' form some exporters emit.
#[must_use]
pub fn parse_wire_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, WIRE_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// Format a timestamp for the wire.
#[must_use]
pub fn format_wire_time(time: NaiveDateTime) -> String {
    time.format(WIRE_TIME_FORMAT).to_string()
}

/// Structural problems with an import document.
#[derive(Debug, Error)]
pub enum FileFormatError {
    #[error("document is not well-formed JSON: {0}")]
    Document(#[from] serde_json::Error),
    #[error("record rejected: {0}")]
    Record(#[from] ValidationError),
    #[error("unsupported interchange version {found:?}; importer accepts major version {accepted}")]
    UnsupportedVersion { found: String, accepted: u32 },
    #[error("document is {size} bytes, above the {limit} byte import limit")]
    Oversize { size: usize, limit: usize },
}

/// Boundary check: reject oversized payloads before any decoding happens.
///
/// # Errors
///
/// Returns [`FileFormatError::Oversize`] when the payload exceeds
/// [`MAX_IMPORT_BYTES`].
pub fn check_import_size(bytes: &[u8]) -> Result<(), FileFormatError> {
    if bytes.len() > MAX_IMPORT_BYTES {
        return Err(FileFormatError::Oversize {
            size: bytes.len(),
            limit: MAX_IMPORT_BYTES,
        });
    }
    Ok(())
}

/// One record as it appears on the wire, before validation. String-typed
/// throughout; the validator turns it into a [`GachaRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub gacha_id: String,
    /// Pool code token: "1", "2", "11" or "12".
    pub gacha_type: String,
    #[serde(default)]
    pub item_id: String,
    /// Item kind label: "角色" or "光锥".
    pub item_type: String,
    /// Rarity token: "3", "4" or "5".
    pub rank_type: String,
    pub time: String,
}

/// Internal persistence/export document mirroring the ledger 1:1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeDocument {
    pub user_id: String,
    pub uid: String,
    pub update_time: String,
    #[serde(default)]
    pub import_type: String,
    /// Records keyed by native pool label ("常驻跃迁" and friends).
    pub item_list: BTreeMap<String, Vec<RawRecord>>,
}

impl NativeDocument {
    /// Flatten all pools into one raw record list for validation.
    #[must_use]
    pub fn records(&self) -> Vec<RawRecord> {
        self.item_list.values().flatten().cloned().collect()
    }
}

/// Decode a native document.
///
/// # Errors
///
/// Returns [`FileFormatError::Document`] when the payload is not a
/// well-formed native document.
pub fn decode_native(bytes: &[u8]) -> Result<NativeDocument, FileFormatError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn default_lang() -> String {
    "zh-cn".to_string()
}

fn default_region_time_zone() -> i32 {
    8
}

fn default_uid() -> String {
    "0".to_string()
}

fn default_count() -> String {
    "1".to_string()
}

/// SRGF `info` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrgfInfo {
    #[serde(default = "default_uid")]
    pub uid: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_region_time_zone")]
    pub region_time_zone: i32,
    #[serde(default)]
    pub export_time: String,
    #[serde(default)]
    pub export_timestamp: i64,
    #[serde(default)]
    pub export_app: String,
    #[serde(default)]
    pub export_app_version: String,
    pub srgf_version: String,
}

impl SrgfInfo {
    /// Major version carried by `srgf_version` ("v1.0" -> 1).
    #[must_use]
    pub fn major_version(&self) -> Option<u32> {
        self.srgf_version
            .trim()
            .trim_start_matches(['v', 'V'])
            .split('.')
            .next()?
            .parse()
            .ok()
    }
}

/// One SRGF list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrgfItem {
    pub id: String,
    pub name: String,
    #[serde(default = "default_count")]
    pub count: String,
    #[serde(default)]
    pub gacha_id: String,
    pub gacha_type: String,
    #[serde(default)]
    pub item_id: String,
    pub item_type: String,
    pub rank_type: String,
    pub time: String,
}

/// Versioned, self-describing interchange export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrgfDocument {
    pub info: SrgfInfo,
    pub list: Vec<SrgfItem>,
}

impl SrgfDocument {
    /// Convert the list into the shared raw record shape.
    #[must_use]
    pub fn records(&self) -> Vec<RawRecord> {
        self.list
            .iter()
            .map(|item| RawRecord {
                id: item.id.clone(),
                name: item.name.clone(),
                gacha_id: item.gacha_id.clone(),
                gacha_type: item.gacha_type.clone(),
                item_id: item.item_id.clone(),
                item_type: item.item_type.clone(),
                rank_type: item.rank_type.clone(),
                time: item.time.clone(),
            })
            .collect()
    }
}

/// Decode and version-check an SRGF document.
///
/// # Errors
///
/// Returns [`FileFormatError::Document`] for malformed JSON and
/// [`FileFormatError::UnsupportedVersion`] when the document's major version
/// differs from the importer's.
pub fn decode_srgf(bytes: &[u8]) -> Result<SrgfDocument, FileFormatError> {
    let document: SrgfDocument = serde_json::from_slice(bytes)?;
    let accepted = accepted_major_version();
    if document.info.major_version() != Some(accepted) {
        return Err(FileFormatError::UnsupportedVersion {
            found: document.info.srgf_version.clone(),
            accepted,
        });
    }
    Ok(document)
}

fn accepted_major_version() -> u32 {
    SRGF_VERSION
        .trim_start_matches('v')
        .split('.')
        .next()
        .and_then(|major| major.parse().ok())
        .unwrap_or(1)
}

/// Encode a ledger as a fresh SRGF export.
///
/// Stamps `export_time`/`export_timestamp` from `now` and the codec's
/// current [`SRGF_VERSION`]. Pool and item enums are emitted with their
/// externally recognized tokens; records keep their per-pool time order.
#[must_use]
pub fn encode_srgf(
    ledger: &Ledger,
    export_app: &str,
    export_app_version: &str,
    now: NaiveDateTime,
) -> SrgfDocument {
    let mut list = Vec::with_capacity(ledger.total_records());
    for pool in PoolType::ALL {
        for record in ledger.pool(pool) {
            list.push(srgf_item(record));
        }
    }
    SrgfDocument {
        info: SrgfInfo {
            uid: ledger.uid.clone(),
            lang: default_lang(),
            region_time_zone: default_region_time_zone(),
            export_time: format_wire_time(now),
            export_timestamp: now.and_utc().timestamp(),
            export_app: export_app.to_string(),
            export_app_version: export_app_version.to_string(),
            srgf_version: SRGF_VERSION.to_string(),
        },
        list,
    }
}

fn srgf_item(record: &GachaRecord) -> SrgfItem {
    SrgfItem {
        id: record.id.clone(),
        name: record.name.clone(),
        count: default_count(),
        gacha_id: String::new(),
        gacha_type: record.pool_type.wire_token().to_string(),
        item_id: record.item_id.clone(),
        item_type: record.item_kind.wire_label().to_string(),
        rank_type: record.rarity.to_string(),
        time: format_wire_time(record.time),
    }
}

/// Encode a ledger as a native document for local persistence or the legacy
/// export path.
#[must_use]
pub fn encode_native(ledger: &Ledger, user_id: i64) -> NativeDocument {
    let mut item_list = BTreeMap::new();
    for pool in PoolType::ALL {
        let records = ledger
            .pool(pool)
            .iter()
            .map(|record| RawRecord {
                id: record.id.clone(),
                name: record.name.clone(),
                gacha_id: String::new(),
                gacha_type: pool.wire_token().to_string(),
                item_id: record.item_id.clone(),
                item_type: record.item_kind.wire_label().to_string(),
                rank_type: record.rarity.to_string(),
                time: format_wire_time(record.time),
            })
            .collect();
        item_list.insert(pool.native_label().to_string(), records);
    }
    NativeDocument {
        user_id: user_id.to_string(),
        uid: ledger.uid.clone(),
        update_time: format_wire_time(ledger.update_time),
        import_type: match ledger.provenance {
            Provenance::Native => "native".to_string(),
            Provenance::Srgf => "srgf".to_string(),
            Provenance::Unset => String::new(),
        },
        item_list,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_time_accepts_both_separators() {
        let space = parse_wire_time("2023-05-01 12:30:00").unwrap();
        let iso = parse_wire_time("2023-05-01T12:30:00").unwrap();
        assert_eq!(space, iso);
        assert!(parse_wire_time("yesterday").is_none());
        assert_eq!(format_wire_time(space), "2023-05-01 12:30:00");
    }

    #[test]
    fn oversize_payloads_are_rejected_before_decode() {
        let oversized = vec![b'x'; MAX_IMPORT_BYTES + 1];
        assert!(matches!(
            check_import_size(&oversized),
            Err(FileFormatError::Oversize { .. })
        ));
        assert!(check_import_size(b"{}").is_ok());
    }

    #[test]
    fn srgf_version_gate_accepts_same_major_only() {
        let document = |version: &str| {
            format!(
                r#"{{"info":{{"uid":"100000001","srgf_version":"{version}"}},"list":[]}}"#
            )
        };
        assert!(decode_srgf(document("v1.0").as_bytes()).is_ok());
        assert!(decode_srgf(document("v1.4").as_bytes()).is_ok());
        assert!(matches!(
            decode_srgf(document("v2.0").as_bytes()),
            Err(FileFormatError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn srgf_info_defaults_match_the_format() {
        let document =
            decode_srgf(br#"{"info":{"srgf_version":"v1.0"},"list":[]}"#).unwrap();
        assert_eq!(document.info.uid, "0");
        assert_eq!(document.info.lang, "zh-cn");
        assert_eq!(document.info.region_time_zone, 8);
    }

    #[test]
    fn malformed_json_is_a_document_error() {
        assert!(matches!(
            decode_srgf(b"not json"),
            Err(FileFormatError::Document(_))
        ));
        assert!(matches!(
            decode_native(b"[1,2,3]"),
            Err(FileFormatError::Document(_))
        ));
    }

    #[test]
    fn srgf_items_keep_optional_fields_when_present() {
        let payload = r#"{
            "info": {"uid": "100000001", "srgf_version": "v1.0"},
            "list": [{
                "id": "1683774000000000000",
                "name": "希儿",
                "gacha_id": "2003",
                "gacha_type": "11",
                "item_id": "1102",
                "item_type": "角色",
                "rank_type": "5",
                "time": "2023-05-11 11:00:00"
            }]
        }"#;
        let document = decode_srgf(payload.as_bytes()).unwrap();
        assert_eq!(document.list[0].gacha_id, "2003");
        assert_eq!(document.list[0].count, "1");
        let records = document.records();
        assert_eq!(records[0].gacha_type, "11");
    }
}
