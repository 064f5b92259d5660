//! Google Maps リスティングETLライブラリ
//!
//! - ブラウザを駆動してリスティング（店舗名・住所・評価・座標）を抽出
//! - 生データを正規化し、CSVとNDJSONの2形式で保存
//!
//! # パイプライン使用例
//!
//! ```rust,ignore
//! use gmaps_etl_service::{run_etl, EtlConfig, GmapsConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = EtlConfig::new(GmapsConfig::new("coffee shop", "Semarang, Indonesia"))
//!         .with_output_csv("output/places.csv")
//!         .with_output_json("output/places.json");
//!
//!     let result = run_etl(config).await.unwrap();
//!     println!("Records: {}", result.records.len());
//! }
//! ```
//!
//! # tower Service 使用例
//!
//! ```rust,ignore
//! use gmaps_etl_service::{EtlRequest, EtlService};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut service = EtlService::new();
//!
//!     let request = EtlRequest::new("coffee shop", "Semarang, Indonesia")
//!         .with_headless(true)
//!         .with_scroll_iterations(10);
//!
//!     let result = service.call(request).await.unwrap();
//!     println!("Persisted: {}", result.persisted);
//! }
//! ```

pub mod config;
pub mod error;
pub mod gmaps;
pub mod load;
pub mod service;
pub mod traits;
pub mod transform;

// 主要な型をリエクスポート
pub use config::{EtlConfig, GmapsConfig};
pub use error::EtlError;
pub use gmaps::{GmapsScraper, RawRecord, ScrapeOutcome};
pub use service::{run_etl, EtlRequest, EtlResult, EtlService};
pub use traits::Scraper;
pub use transform::{normalize, NormalizedRecord};
