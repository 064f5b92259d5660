use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tower::Service;
use tracing::info;

use crate::config::{EtlConfig, GmapsConfig};
use crate::error::EtlError;
use crate::gmaps::GmapsScraper;
use crate::load;
use crate::transform::{self, NormalizedRecord};

/// ETLパイプラインを実行する
///
/// 抽出 → 正規化 → 永続化の順で流す。抽出が未回復エラーで終わった
/// 場合でも、収集済みの部分結果を正規化・保存してからエラーを
/// 伝播する。
pub async fn run_etl(config: EtlConfig) -> Result<EtlResult, EtlError> {
    info!("Starting Google Maps ETL pipeline");

    info!("Starting extraction phase");
    let mut scraper = GmapsScraper::new(config.gmaps.clone());
    let outcome = scraper.scrape().await;
    info!(
        "Extraction complete: {} records extracted",
        outcome.records.len()
    );

    info!("Starting transformation phase");
    let records = transform::normalize(&outcome.records);

    let persisted = load::persist(&records, &config.output_csv, &config.output_json);

    // 部分結果の保存が済んでから未回復エラーを伝播する
    if let Some(e) = outcome.error {
        return Err(e);
    }

    Ok(EtlResult {
        records,
        csv_path: config.output_csv,
        json_path: config.output_json,
        persisted,
    })
}

/// ETLリクエスト
#[derive(Debug, Clone)]
pub struct EtlRequest {
    pub search_query: String,
    pub location: String,
    pub output_csv: PathBuf,
    pub output_json: PathBuf,
    pub headless: bool,
    pub scroll_iterations: u32,
    pub scroll_delay: Duration,
}

impl EtlRequest {
    pub fn new(search_query: impl Into<String>, location: impl Into<String>) -> Self {
        let defaults = EtlConfig::default();
        Self {
            search_query: search_query.into(),
            location: location.into(),
            output_csv: defaults.output_csv,
            output_json: defaults.output_json,
            headless: true,
            scroll_iterations: defaults.gmaps.scroll_iterations,
            scroll_delay: defaults.gmaps.scroll_delay,
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

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_scroll_iterations(mut self, iterations: u32) -> Self {
        self.scroll_iterations = iterations;
        self
    }
}

impl From<EtlRequest> for EtlConfig {
    fn from(req: EtlRequest) -> Self {
        let gmaps = GmapsConfig::new(req.search_query, req.location)
            .with_headless(req.headless)
            .with_scroll_iterations(req.scroll_iterations)
            .with_scroll_delay(req.scroll_delay);

        EtlConfig::new(gmaps)
            .with_output_csv(req.output_csv)
            .with_output_json(req.output_json)
    }
}

/// ETL実行結果
#[derive(Debug)]
pub struct EtlResult {
    /// 正規化済みレコード
    pub records: Vec<NormalizedRecord>,
    pub csv_path: PathBuf,
    pub json_path: PathBuf,
    /// 両形式の書き込みが成功したか
    pub persisted: bool,
}

/// tower::Serviceを実装したETLサービス
#[derive(Debug, Clone, Default)]
pub struct EtlService {
    // 将来的な拡張用（レートリミット、キャッシュなど）
}

impl EtlService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Service<EtlRequest> for EtlService {
    type Response = EtlResult;
    type Error = EtlError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: EtlRequest) -> Self::Future {
        info!(
            "ETLリクエスト受信: query={}, location={}",
            req.search_query, req.location
        );

        Box::pin(async move {
            let config: EtlConfig = req.into();
            let result = run_etl(config).await?;

            info!(
                "ETL完了: records={}, csv={:?}, json={:?}, persisted={}",
                result.records.len(),
                result.csv_path,
                result.json_path,
                result.persisted
            );

            Ok(result)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etl_request_builder() {
        let req = EtlRequest::new("coffee shop", "Semarang, Indonesia")
            .with_output_csv("/tmp/out.csv")
            .with_output_json("/tmp/out.json")
            .with_headless(false)
            .with_scroll_iterations(5);

        assert_eq!(req.search_query, "coffee shop");
        assert_eq!(req.location, "Semarang, Indonesia");
        assert_eq!(req.output_csv, PathBuf::from("/tmp/out.csv"));
        assert_eq!(req.output_json, PathBuf::from("/tmp/out.json"));
        assert!(!req.headless);
        assert_eq!(req.scroll_iterations, 5);
    }

    #[test]
    fn test_etl_request_to_config() {
        let req = EtlRequest::new("ramen", "Tokyo, Japan").with_scroll_iterations(7);
        let config: EtlConfig = req.into();

        assert_eq!(config.gmaps.search_query, "ramen");
        assert_eq!(config.gmaps.location, "Tokyo, Japan");
        assert_eq!(config.gmaps.scroll_iterations, 7);
        assert_eq!(config.output_csv, PathBuf::from("output/places.csv"));
    }
}
