//! ブラウザセッションライフサイクル管理
//!
//! セッションの起動・破棄・再起動を一手に引き受ける。再起動は
//! 「作り直しによる回復」であり、検索とスクロールを再実行して
//! スキャナを新規実行と等価な状態に戻す。

use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::GmapsConfig;
use crate::error::EtlError;
use crate::gmaps::scanner;
use crate::gmaps::selector::Advisory;

const GOOGLE_MAPS_URL: &str = "https://www.google.com/maps";

/// インタースティシャル消去後の描画待ち
const INTERSTITIAL_SETTLE_SECS: u64 = 2;

/// セッション状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active,
    Restarting,
    Closed,
}

/// 1実行あたりの再起動回数の予算
///
/// ナビゲーション復帰が恒常的に壊れている場合の無限再起動ループを
/// 防ぐため、上限超過で構造的エラーを返す。
#[derive(Debug, Clone)]
pub struct RestartBudget {
    used: u32,
    max: u32,
}

impl RestartBudget {
    pub fn new(max: u32) -> Self {
        Self { used: 0, max }
    }

    /// 再起動1回分を消費する。上限超過なら `RestartLimit`
    pub fn try_consume(&mut self) -> Result<(), EtlError> {
        if self.used >= self.max {
            return Err(EtlError::RestartLimit(self.max));
        }
        self.used += 1;
        Ok(())
    }

    pub fn used(&self) -> u32 {
        self.used
    }
}

/// セッションコントローラ
///
/// ブラウザハンドルの唯一の所有者。再起動をまたいで他コンポーネントが
/// ページ参照を保持してはならない。
pub struct SessionController {
    config: GmapsConfig,
    browser: Option<Browser>,
    page: Option<Arc<Page>>,
    state: SessionState,
    restart_budget: RestartBudget,
}

impl SessionController {
    pub fn new(config: GmapsConfig) -> Self {
        let restart_budget = RestartBudget::new(config.max_restarts);
        Self {
            config,
            browser: None,
            page: None,
            state: SessionState::Uninitialized,
            restart_budget,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn restarts_used(&self) -> u32 {
        self.restart_budget.used()
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            info!("Session state: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// 現在のページハンドル
    pub fn page(&self) -> Result<&Arc<Page>, EtlError> {
        self.page
            .as_ref()
            .ok_or_else(|| EtlError::Session("ブラウザが初期化されていません".into()))
    }

    /// ブラウザを起動し、Google Mapsへナビゲートする
    pub async fn start(&mut self) -> Result<(), EtlError> {
        info!("Initializing browser session...");

        // ユニークなユーザーデータディレクトリを生成
        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("gmaps-etl-{}", unique_id));

        // Chrome パスを取得
        let chrome_path = std::env::var("CHROME_PATH")
            .or_else(|_| std::env::var("CHROMIUM_PATH"))
            .unwrap_or_else(|_| "chromium".to_string());

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(&user_data_dir)
            .window_size(1280, 800);

        if !self.config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .no_sandbox()
            .request_timeout(Duration::from_secs(60))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-notifications");

        if self.config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder
            .build()
            .map_err(|e| EtlError::BrowserInit(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| EtlError::BrowserInit(e.to_string()))?;

        // ブラウザイベントハンドラをバックグラウンドで実行
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| EtlError::BrowserInit(e.to_string()))?;

        page.goto(GOOGLE_MAPS_URL)
            .await
            .map_err(|e| EtlError::Navigation(e.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| EtlError::Navigation(e.to_string()))?;
        info!("Navigated to Google Maps");

        // 初回インタースティシャルはベストエフォートで消す
        let advisory = Self::dismiss_interstitial(&page).await;
        if advisory.applied() {
            info!("Dismissed first-run interstitial");
            sleep(Duration::from_secs(INTERSTITIAL_SETTLE_SECS)).await;
        } else {
            debug!("No first-run interstitial found");
        }

        self.browser = Some(browser);
        self.page = Some(Arc::new(page));
        self.set_state(SessionState::Active);

        info!("Browser session ready");
        Ok(())
    }

    /// 初回インタースティシャル（同意・続行ダイアログ）の消去
    ///
    /// 出ないことも正常。結果は助言的で、エラーとして伝播しない。
    async fn dismiss_interstitial(page: &Page) -> Advisory {
        let result = page
            .evaluate(
                r#"
                (() => {
                    const labels = ['Continue', 'Accept all', 'I agree'];
                    const buttons = document.querySelectorAll('button');
                    for (const button of buttons) {
                        const text = (button.textContent || '').trim();
                        if (labels.some(label => text.indexOf(label) >= 0)) {
                            button.click();
                            return true;
                        }
                    }
                    return false;
                })()
                "#,
            )
            .await;

        match result {
            Ok(value) => {
                if value.into_value::<bool>().unwrap_or(false) {
                    Advisory::Applied
                } else {
                    Advisory::NotApplied
                }
            }
            Err(e) => {
                debug!("Interstitial dismissal probe failed: {}", e);
                Advisory::NotApplied
            }
        }
    }

    /// セッションを作り直し、検索とスクロールを再実行する
    ///
    /// 再起動後、スキャナは新規実行と等価な状態に戻る。再起動前に
    /// 取得したDOMハンドルはすべて無効になる。
    pub async fn restart_and_research(&mut self) -> Result<(), EtlError> {
        self.restart_budget.try_consume()?;
        self.set_state(SessionState::Restarting);
        warn!(
            "Restarting browser session ({}/{})",
            self.restart_budget.used(),
            self.config.max_restarts
        );

        // 破棄はベストエフォート。失敗しても再起動を続行する
        // Page::closeはselfを消費するためArcから複製して閉じる
        if let Some(page) = self.page.take() {
            if let Err(e) = page.as_ref().clone().close().await {
                debug!("Failed to close page during restart: {}", e);
            }
        }
        self.browser = None;

        self.start().await?;

        let page = self.page()?.clone();
        scanner::search(&page, &self.config).await?;
        scanner::load_more(
            &page,
            self.config.scroll_iterations,
            self.config.scroll_delay,
        )
        .await?;

        self.set_state(SessionState::Active);
        info!("Session restarted and search re-established");
        Ok(())
    }

    /// セッションを終了する（冪等）
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        if let Some(page) = self.page.take() {
            if let Err(e) = page.as_ref().clone().close().await {
                debug!("Failed to close page: {}", e);
            }
        }
        self.browser = None;
        self.set_state(SessionState::Closed);
        info!("Browser session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_budget_caps_attempts() {
        let mut budget = RestartBudget::new(3);
        assert!(budget.try_consume().is_ok());
        assert!(budget.try_consume().is_ok());
        assert!(budget.try_consume().is_ok());

        match budget.try_consume() {
            Err(EtlError::RestartLimit(3)) => {}
            other => panic!("expected RestartLimit(3), got {:?}", other),
        }
        assert_eq!(budget.used(), 3);
    }

    #[test]
    fn test_new_controller_is_uninitialized() {
        let controller = SessionController::new(GmapsConfig::default());
        assert_eq!(controller.state(), SessionState::Uninitialized);
        assert_eq!(controller.restarts_used(), 0);
        assert!(controller.page().is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_without_browser() {
        let mut controller = SessionController::new(GmapsConfig::default());
        controller.close().await;
        assert_eq!(controller.state(), SessionState::Closed);
        // 2回目も安全
        controller.close().await;
        assert_eq!(controller.state(), SessionState::Closed);
    }
}
