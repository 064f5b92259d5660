//! Google Maps 抽出関連の型定義

use serde::{Deserialize, Serialize};

use crate::error::EtlError;

/// フィールドが取得できなかった場合のセンチネル値
///
/// RawRecordは4フィールドすべてを必ず持つ。欠損はキー欠落ではなく
/// センチネル文字列で表現する。
pub const NO_NAME: &str = "No name";
pub const NO_ADDRESS: &str = "No address";
pub const NO_RATING: &str = "No rating";
pub const NO_COORDINATES: &str = "No coordinates";

/// 1リスティング分の生抽出データ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawRecord {
    /// 店舗名（取得失敗時は "No name"）
    pub name: String,
    /// 住所（取得失敗時は "No address"）
    pub address: String,
    /// 評価の表示文字列（取得失敗時は "No rating"）
    pub rating: String,
    /// "lat,lng" 形式の座標（取得失敗時は "No coordinates"）
    pub coordinates: String,
}

impl RawRecord {
    /// 全フィールドがセンチネルの空レコード
    pub fn empty() -> Self {
        Self {
            name: NO_NAME.to_string(),
            address: NO_ADDRESS.to_string(),
            rating: NO_RATING.to_string(),
            coordinates: NO_COORDINATES.to_string(),
        }
    }
}

/// 抽出フェーズの結果
///
/// 途中で構造的エラーが起きても、それまでに収集済みのレコードは
/// 破棄せずここに残す。エラーの有無とレコードは独立して扱う。
#[derive(Debug)]
pub struct ScrapeOutcome {
    /// 収集済みレコード（エラー発生時は部分結果）
    pub records: Vec<RawRecord>,
    /// 未回復のまま残ったエラー（あれば）
    pub error: Option<EtlError>,
}

impl ScrapeOutcome {
    pub fn ok(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            error: None,
        }
    }

    pub fn partial(records: Vec<RawRecord>, error: EtlError) -> Self {
        Self {
            records,
            error: Some(error),
        }
    }
}
