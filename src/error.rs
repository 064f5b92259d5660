use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("JavaScript実行エラー: {0}")]
    JavaScript(String),

    #[error("検索ボックスが見つかりません: {0}")]
    SearchBoxNotFound(String),

    #[error("結果フィードが見つかりません: {0}")]
    ResultsContainerNotFound(String),

    #[error("抽出エラー: {0}")]
    Extraction(String),

    #[error("セッションエラー: {0}")]
    Session(String),

    #[error("セッション再起動回数が上限に達しました: {0}回")]
    RestartLimit(u32),

    #[error("キャンセルされました")]
    Cancelled,

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("CSV書き込みエラー: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSONシリアライズエラー: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtlError {
    /// 抽出フェーズ全体を打ち切る構造的エラーかどうか
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            EtlError::BrowserInit(_)
                | EtlError::SearchBoxNotFound(_)
                | EtlError::ResultsContainerNotFound(_)
                | EtlError::RestartLimit(_)
        )
    }
}
