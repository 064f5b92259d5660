//! Google Maps リスティングETLパイプラインのCLIエントリポイント

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gmaps_etl_service::{run_etl, EtlConfig, GmapsConfig};

#[derive(Parser, Debug)]
#[command(name = "gmaps-etl", version, about = "Google Maps リスティングETLパイプライン")]
struct Cli {
    /// 検索クエリ（例: "coffee shop"）
    #[arg(long, env = "GMAPS_SEARCH_QUERY", default_value = "coffee shop")]
    search_query: String,

    /// 検索対象の地域
    #[arg(long, env = "GMAPS_LOCATION", default_value = "Semarang, Indonesia")]
    location: String,

    /// CSV出力パス
    #[arg(long, default_value = "output/places.csv")]
    output_csv: PathBuf,

    /// NDJSON出力パス
    #[arg(long, default_value = "output/places.json")]
    output_json: PathBuf,

    /// ヘッドレスモードで実行
    #[arg(long)]
    headless: bool,

    /// 結果フィードのスクロール回数
    #[arg(long, default_value_t = 20)]
    scroll_iterations: u32,

    /// スクロール間の待機秒数
    #[arg(long, default_value_t = 2)]
    scroll_delay: u64,

    /// ログレベル（DEBUG/INFO/WARNING/ERROR）
    #[arg(long, default_value = "INFO")]
    log_level: String,

    /// デバッグモード（スクリーンショットのログ出力など）
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn into_config(self) -> EtlConfig {
        let gmaps = GmapsConfig::new(self.search_query, self.location)
            .with_headless(self.headless)
            .with_scroll_iterations(self.scroll_iterations)
            .with_scroll_delay(Duration::from_secs(self.scroll_delay))
            .with_debug(self.debug);

        EtlConfig::new(gmaps)
            .with_output_csv(self.output_csv)
            .with_output_json(self.output_json)
    }
}

/// ログレベル指定をtracingのディレクティブに写す
fn level_directive(level: &str) -> &'static str {
    match level.to_ascii_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" | "WARN" => "warn",
        "ERROR" => "error",
        _ => "info",
    }
}

fn init_logging(level: &str) {
    // RUST_LOG があればそちらを優先する
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(level)));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = cli.into_config();

    match run_etl(config).await {
        Ok(result) => {
            info!(
                "ETL pipeline finished: {} records, persisted={}",
                result.records.len(),
                result.persisted
            );
            // レコードがあるのに両形式とも保存できなかった実行は失敗扱い
            if !result.persisted && !result.records.is_empty() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("ETL pipeline failed: {}", e);
            std::process::exit(1);
        }
    }
}
