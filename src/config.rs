use std::path::PathBuf;
use std::time::Duration;

/// Google Maps 抽出設定
///
/// 1回の実行中は不変。タイミング系はすべて `Duration` で保持する。
#[derive(Debug, Clone)]
pub struct GmapsConfig {
    /// 検索クエリ（例: "coffee shop"）
    pub search_query: String,
    /// 検索対象の地域（例: "Semarang, Indonesia"）
    pub location: String,
    /// ヘッドレスモード
    pub headless: bool,
    /// 結果フィードのスクロール回数（固定回数・収束判定なし）
    pub scroll_iterations: u32,
    /// スクロール間の待機時間
    pub scroll_delay: Duration,
    /// セレクタチェーン解決のタイムアウト
    pub wait_time: Duration,
    /// 詳細ビュー描画の待機時間
    pub detail_wait_time: Duration,
    /// リスト復帰後の待機時間
    pub result_delay: Duration,
    /// 1実行あたりのセッション再起動上限
    pub max_restarts: u32,
    /// デバッグモード（検索後にスクリーンショットをログ出力）
    pub debug: bool,
}

impl Default for GmapsConfig {
    fn default() -> Self {
        Self {
            search_query: "coffee shop".to_string(),
            location: "Semarang, Indonesia".to_string(),
            headless: true,
            scroll_iterations: 20,
            scroll_delay: Duration::from_secs(2),
            wait_time: Duration::from_secs(5),
            detail_wait_time: Duration::from_secs(3),
            result_delay: Duration::from_secs(2),
            max_restarts: 3,
            debug: false,
        }
    }
}

impl GmapsConfig {
    pub fn new(search_query: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            search_query: search_query.into(),
            location: location.into(),
            ..Default::default()
        }
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_scroll_iterations(mut self, iterations: u32) -> Self {
        self.scroll_iterations = iterations;
        self
    }

    pub fn with_scroll_delay(mut self, delay: Duration) -> Self {
        self.scroll_delay = delay;
        self
    }

    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// パイプライン全体の設定（抽出設定＋出力先）
#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub gmaps: GmapsConfig,
    /// CSV出力パス
    pub output_csv: PathBuf,
    /// NDJSON出力パス
    pub output_json: PathBuf,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            gmaps: GmapsConfig::default(),
            output_csv: PathBuf::from("output/places.csv"),
            output_json: PathBuf::from("output/places.json"),
        }
    }
}

impl EtlConfig {
    pub fn new(gmaps: GmapsConfig) -> Self {
        Self {
            gmaps,
            ..Default::default()
        }
    }

    pub fn with_output_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_csv = path.into();
        self
    }

    pub fn with_output_json(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_json = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gmaps_config_builder() {
        let config = GmapsConfig::new("ramen", "Tokyo, Japan")
            .with_headless(false)
            .with_scroll_iterations(5)
            .with_scroll_delay(Duration::from_secs(1))
            .with_max_restarts(1)
            .with_debug(true);

        assert_eq!(config.search_query, "ramen");
        assert_eq!(config.location, "Tokyo, Japan");
        assert!(!config.headless);
        assert_eq!(config.scroll_iterations, 5);
        assert_eq!(config.scroll_delay, Duration::from_secs(1));
        assert_eq!(config.max_restarts, 1);
        assert!(config.debug);
    }

    #[test]
    fn test_etl_config_defaults() {
        let config = EtlConfig::default();
        assert_eq!(config.output_csv, PathBuf::from("output/places.csv"));
        assert_eq!(config.output_json, PathBuf::from("output/places.json"));
        assert_eq!(config.gmaps.scroll_iterations, 20);
        assert_eq!(config.gmaps.max_restarts, 3);
    }

    #[test]
    fn test_etl_config_output_paths() {
        let config = EtlConfig::new(GmapsConfig::default())
            .with_output_csv("/tmp/out.csv")
            .with_output_json("/tmp/out.json");

        assert_eq!(config.output_csv, PathBuf::from("/tmp/out.csv"));
        assert_eq!(config.output_json, PathBuf::from("/tmp/out.json"));
    }
}
