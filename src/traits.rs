use async_trait::async_trait;

use crate::error::EtlError;
use crate::gmaps::types::RawRecord;

#[async_trait]
pub trait Scraper: Send + Sync {
    /// ブラウザセッション起動
    async fn initialize(&mut self) -> Result<(), EtlError>;

    /// 検索実行とフィードの追加読み込み
    async fn search(&mut self) -> Result<(), EtlError>;

    /// カード巡回とレコード収集
    async fn collect(&mut self) -> Result<Vec<RawRecord>, EtlError>;

    /// リソース解放
    async fn close(&mut self) -> Result<(), EtlError>;

    /// 一括実行（initialize → search → collect、全経路でclose）
    ///
    /// 部分結果込みのエラー処理が必要な場合は `GmapsScraper::scrape` を
    /// 使うこと。
    async fn execute(&mut self) -> Result<Vec<RawRecord>, EtlError> {
        if let Err(e) = self.initialize().await {
            let _ = self.close().await;
            return Err(e);
        }
        if let Err(e) = self.search().await {
            let _ = self.close().await;
            return Err(e);
        }
        let result = self.collect().await;
        self.close().await?;
        result
    }
}
