//! 生レコードの正規化
//!
//! センチネル値を「欠損」に写し、評価と座標を数値化し、バッチ共通の
//! 抽出タイムスタンプを付与する純粋な変換ステージ。

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::gmaps::types::{RawRecord, NO_COORDINATES, NO_NAME, NO_RATING};

static RATING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(\.\d+)?)").unwrap());

/// 正規化済みレコード
///
/// 生フィールドはそのまま残し、派生フィールドを追加する。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedRecord {
    /// trim済みの店舗名（センチネルは欠損に写す）
    pub name: Option<String>,
    pub address: String,
    pub rating: String,
    pub coordinates: String,
    pub rating_numeric: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// バッチ全体で同一のタイムスタンプ（レコード個別の時刻ではない）
    pub extraction_timestamp: DateTime<Utc>,
}

/// 生レコード群を正規化する
///
/// タイムスタンプはバッチ単位で1回だけ取得する。これは意図した
/// 単純化であり、レコード個別の時刻に変えてはならない。
pub fn normalize(records: &[RawRecord]) -> Vec<NormalizedRecord> {
    if records.is_empty() {
        warn!("No data to transform");
        return Vec::new();
    }

    info!("Transforming {} records", records.len());
    let stamp = Utc::now();

    let normalized: Vec<NormalizedRecord> = records
        .iter()
        .map(|record| normalize_one(record, stamp))
        .collect();

    info!("Transformation complete, resulting in {} records", normalized.len());
    normalized
}

fn normalize_one(record: &RawRecord, stamp: DateTime<Utc>) -> NormalizedRecord {
    let name = clean_name(&record.name);
    let rating_numeric = parse_rating(&record.rating);
    let (latitude, longitude) = match parse_coordinates(&record.coordinates) {
        Some((lat, lng)) => (Some(lat), Some(lng)),
        None => (None, None),
    };

    NormalizedRecord {
        name,
        address: record.address.clone(),
        rating: record.rating.clone(),
        coordinates: record.coordinates.clone(),
        rating_numeric,
        latitude,
        longitude,
        extraction_timestamp: stamp,
    }
}

/// 店舗名をtrimし、センチネルを欠損に写す
fn clean_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == NO_NAME {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// 評価文字列から最初の10進数を取り出す
pub fn parse_rating(raw: &str) -> Option<f64> {
    if raw.is_empty() || raw == NO_RATING {
        return None;
    }
    RATING_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// "lat,lng" を数値の組にパースする
///
/// センチネル・不正形式・非数値は欠損として扱い、警告ログのみ出す。
/// 片方だけ数値として残すことはしない。
pub fn parse_coordinates(raw: &str) -> Option<(f64, f64)> {
    if raw.is_empty() || raw == NO_COORDINATES {
        return None;
    }

    let Some((lat, lng)) = raw.split_once(',') else {
        warn!("Failed to parse coordinates '{}': missing comma", raw);
        return None;
    };

    match (lat.trim().parse::<f64>(), lng.trim().parse::<f64>()) {
        (Ok(latitude), Ok(longitude)) => Some((latitude, longitude)),
        _ => {
            warn!("Failed to parse coordinates '{}': non-numeric component", raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmaps::types::{NO_ADDRESS, NO_COORDINATES, NO_NAME, NO_RATING};

    fn record(name: &str, rating: &str, coordinates: &str) -> RawRecord {
        RawRecord {
            name: name.to_string(),
            address: NO_ADDRESS.to_string(),
            rating: rating.to_string(),
            coordinates: coordinates.to_string(),
        }
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn test_rating_string_parses_first_decimal() {
        assert_eq!(parse_rating("4.5 stars"), Some(4.5));
        assert_eq!(parse_rating("4.5"), Some(4.5));
        assert_eq!(parse_rating("Rated 5 overall"), Some(5.0));
        assert_eq!(parse_rating(NO_RATING), None);
        assert_eq!(parse_rating(""), None);
    }

    #[test]
    fn test_rating_parse_is_idempotent() {
        // 既に数値化済みの表現を再パースしても同じ値になる
        let first = parse_rating("4.5 stars").unwrap();
        let reparsed = parse_rating(&first.to_string()).unwrap();
        assert_eq!(first, reparsed);
    }

    #[test]
    fn test_coordinates_split_into_floats() {
        assert_eq!(
            parse_coordinates("-6.9667,110.4167"),
            Some((-6.9667, 110.4167))
        );
        assert_eq!(parse_coordinates(NO_COORDINATES), None);
    }

    #[test]
    fn test_non_numeric_coordinate_component_yields_absent_pair() {
        // 片側が不正なら両方欠損。エラーにはしない
        assert_eq!(parse_coordinates("abc,110.4"), None);
        assert_eq!(parse_coordinates("-6.9667,xyz"), None);
        assert_eq!(parse_coordinates("-6.9667"), None);
    }

    #[test]
    fn test_sentinel_name_becomes_absent() {
        let records = vec![record(NO_NAME, "4.5 stars", "-6.9667,110.4167")];
        let normalized = normalize(&records);
        assert_eq!(normalized[0].name, None);
    }

    #[test]
    fn test_name_is_trimmed() {
        let records = vec![record("  Kopi Luwak  ", NO_RATING, NO_COORDINATES)];
        let normalized = normalize(&records);
        assert_eq!(normalized[0].name.as_deref(), Some("Kopi Luwak"));
        assert_eq!(normalized[0].rating_numeric, None);
        assert_eq!(normalized[0].latitude, None);
        assert_eq!(normalized[0].longitude, None);
    }

    #[test]
    fn test_batch_shares_one_timestamp() {
        let records = vec![
            record("A", "4.5 stars", "-6.9667,110.4167"),
            record("B", "3.0", "No coordinates"),
            record("C", NO_RATING, "1.5,2.5"),
        ];
        let normalized = normalize(&records);
        let stamp = normalized[0].extraction_timestamp;
        assert!(normalized
            .iter()
            .all(|r| r.extraction_timestamp == stamp));
    }

    #[test]
    fn test_derived_fields_populated() {
        let records = vec![record("Warung Kopi", "4.5 stars", "-6.9667,110.4167")];
        let normalized = normalize(&records);
        assert_eq!(normalized[0].rating_numeric, Some(4.5));
        assert_eq!(normalized[0].latitude, Some(-6.9667));
        assert_eq!(normalized[0].longitude, Some(110.4167));
        // 生フィールドはそのまま保持される
        assert_eq!(normalized[0].rating, "4.5 stars");
        assert_eq!(normalized[0].coordinates, "-6.9667,110.4167");
    }
}
