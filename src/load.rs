//! 正規化済みレコードの永続化
//!
//! CSVとNDJSON（1行1レコードのJSON）の2形式に書き出す。片方の失敗は
//! もう片方の書き込みを妨げない。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{error, info, warn};

use crate::error::EtlError;
use crate::transform::NormalizedRecord;

/// 出力先の親ディレクトリを作成する
fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// CSVに書き出す
pub fn save_to_csv(records: &[NormalizedRecord], path: &Path) -> Result<(), EtlError> {
    ensure_parent_dir(path)?;

    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    info!("Data successfully saved to {:?}", path);
    Ok(())
}

/// NDJSONに書き出す（1行につき1レコード）
pub fn save_to_json(records: &[NormalizedRecord], path: &Path) -> Result<(), EtlError> {
    ensure_parent_dir(path)?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for record in records {
        let line = serde_json::to_string(record)?;
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;

    info!("Data successfully saved to {:?}", path);
    Ok(())
}

/// 両形式に永続化する
///
/// 空のレコード集合はno-op（失敗扱い、ファイルも作らない）。
/// 全体の成功は両形式の成功を要求するが、片方の失敗でもう片方の
/// 書き込みを打ち切ることはしない。
pub fn persist(records: &[NormalizedRecord], csv_path: &Path, json_path: &Path) -> bool {
    if records.is_empty() {
        warn!("No data to load");
        return false;
    }

    let csv_ok = match save_to_csv(records, csv_path) {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to save data to CSV: {}", e);
            false
        }
    };

    let json_ok = match save_to_json(records, json_path) {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to save data to JSON: {}", e);
            false
        }
    };

    csv_ok && json_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmaps::types::RawRecord;
    use crate::transform::normalize;

    fn sample_records() -> Vec<NormalizedRecord> {
        normalize(&[
            RawRecord {
                name: "Kopi Semarang".to_string(),
                address: "Jl. Pemuda No.1".to_string(),
                rating: "4.5 stars".to_string(),
                coordinates: "-6.9667,110.4167".to_string(),
            },
            RawRecord::empty(),
        ])
    }

    #[test]
    fn test_empty_records_fail_without_creating_files() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("out.csv");
        let json_path = dir.path().join("out.json");

        assert!(!persist(&[], &csv_path, &json_path));
        assert!(!csv_path.exists());
        assert!(!json_path.exists());
    }

    #[test]
    fn test_persist_writes_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("nested/dir/out.csv");
        let json_path = dir.path().join("nested/dir/out.json");

        let records = sample_records();
        assert!(persist(&records, &csv_path, &json_path));

        let csv_content = std::fs::read_to_string(&csv_path).unwrap();
        // ヘッダ + 2レコード
        assert_eq!(csv_content.lines().count(), 3);
        assert!(csv_content.contains("Kopi Semarang"));

        let json_content = std::fs::read_to_string(&json_path).unwrap();
        assert_eq!(json_content.lines().count(), 2);
        for line in json_content.lines() {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("extraction_timestamp").is_some());
        }
    }

    #[test]
    fn test_one_format_failure_does_not_block_the_other() {
        let dir = tempfile::tempdir().unwrap();
        // CSVパスをディレクトリにして書き込みを失敗させる
        let csv_path = dir.path().join("blocked.csv");
        std::fs::create_dir_all(&csv_path).unwrap();
        let json_path = dir.path().join("out.json");

        let records = sample_records();
        assert!(!persist(&records, &csv_path, &json_path));
        // JSON側は書き込まれている
        assert!(json_path.exists());
        let json_content = std::fs::read_to_string(&json_path).unwrap();
        assert_eq!(json_content.lines().count(), 2);
    }

    #[test]
    fn test_sentinel_record_serializes_with_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("out.json");

        let records = normalize(&[RawRecord::empty()]);
        save_to_json(&records, &json_path).unwrap();

        let content = std::fs::read_to_string(&json_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert!(value["name"].is_null());
        assert!(value["rating_numeric"].is_null());
        assert!(value["latitude"].is_null());
        assert!(value["longitude"].is_null());
        assert_eq!(value["coordinates"], "No coordinates");
    }
}
