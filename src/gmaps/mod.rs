//! Google Maps 抽出モジュール
//!
//! セッション管理・検索・カード巡回・フィールド解決を束ねる。

pub mod extractor;
pub mod scanner;
pub mod selector;
pub mod session;
pub mod types;

pub use extractor::GmapsScraper;
pub use selector::{Advisory, Locator};
pub use session::{RestartBudget, SessionController, SessionState};
pub use types::{RawRecord, ScrapeOutcome};
