//! 検索実行と結果フィードのスキャン
//!
//! 検索ボックスへの入力、フィードの追加読み込み（固定回数スクロール）、
//! 結果カードの列挙を担当する。

use std::time::Duration;

use chromiumoxide::{Element, Page};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::GmapsConfig;
use crate::error::EtlError;
use crate::gmaps::selector::js_string;

/// 検索ボックスのロケータチェーン
const SEARCH_BOX_SELECTORS: &[&str] = &[
    "#searchboxinput",
    "input[name='q']",
    "input.searchboxinput",
];

/// 結果フィードコンテナのロケータチェーン
const FEED_SELECTORS: &[&str] = &["div[role='feed']", "div.m6QErb[aria-label]"];

/// 結果カードのロケータチェーン（先頭が本命、以降は代替）
const CARD_SELECTORS: &[&str] = &[
    "div.Nv2PK",
    "div.DxyBCb.kA9KIf",
    "div[role='article']",
    "div.V0h1Ob-haAclf",
    "div.bfdHYd",
];

/// 検索後、結果が描画され始めるまでの固定待機
const SEARCH_SETTLE_SECS: u64 = 10;
/// フィードコンテナ出現のタイムアウト
const FEED_WAIT_SECS: u64 = 15;
/// 要素探索のポーリング間隔
const FIND_POLL_MS: u64 = 250;

/// "{query} in {location}" 形式の検索フレーズを組み立てる
pub fn search_phrase(query: &str, location: &str) -> String {
    format!("{} in {}", query, location)
}

/// フィードを底までスクロールするJSを生成する
fn scroll_script(selector: &str) -> String {
    format!(
        r#"(() => {{
            const el = document.querySelector({selector});
            if (el) {{ el.scrollTop = el.scrollHeight; }}
        }})()"#,
        selector = js_string(selector)
    )
}

/// セレクタチェーンから最初に見つかった要素を返す
///
/// タイムアウトまでチェーン全体をポーリングする。
async fn find_first(
    page: &Page,
    selectors: &[&'static str],
    timeout: Duration,
) -> Option<(Element, &'static str)> {
    let start = std::time::Instant::now();

    loop {
        for selector in selectors {
            match page.find_element(*selector).await {
                Ok(element) => {
                    debug!("Found element with selector: {}", selector);
                    return Some((element, *selector));
                }
                Err(_) => continue,
            }
        }

        if start.elapsed() >= timeout {
            return None;
        }
        sleep(Duration::from_millis(FIND_POLL_MS)).await;
    }
}

/// 検索を実行する
///
/// 検索ボックスをロケータチェーンで特定し、クリアしてから
/// "{query} in {location}" を入力・送信する。
pub async fn search(page: &Page, config: &GmapsConfig) -> Result<(), EtlError> {
    let (search_box, selector) = find_first(page, SEARCH_BOX_SELECTORS, config.wait_time)
        .await
        .ok_or_else(|| {
            EtlError::SearchBoxNotFound("全セレクタで入力要素が見つかりません".into())
        })?;

    // 既存の入力をクリア
    page.evaluate(format!("document.querySelector({}).value = ''", js_string(selector)).as_str())
        .await
        .map_err(|e| EtlError::JavaScript(e.to_string()))?;

    let phrase = search_phrase(&config.search_query, &config.location);

    search_box
        .click()
        .await
        .map_err(|e| EtlError::Extraction(format!("検索ボックスクリック: {}", e)))?;
    search_box
        .type_str(&phrase)
        .await
        .map_err(|e| EtlError::Extraction(format!("検索クエリ入力: {}", e)))?;
    search_box
        .press_key("Enter")
        .await
        .map_err(|e| EtlError::Extraction(format!("検索送信: {}", e)))?;

    info!("Searching for: {}", phrase);

    // 結果の描画開始を待つ
    sleep(Duration::from_secs(SEARCH_SETTLE_SECS)).await;
    Ok(())
}

/// 結果フィードを固定回数スクロールして追加読み込みを促す
///
/// 収束判定は行わない。末尾を越えたスクロールは無害なno-opであり、
/// 回数不足なら実在するカードより少ない結果になる。
pub async fn load_more(
    page: &Page,
    iterations: u32,
    delay: Duration,
) -> Result<(), EtlError> {
    let (_, feed_selector) = find_first(
        page,
        FEED_SELECTORS,
        Duration::from_secs(FEED_WAIT_SECS),
    )
    .await
    .ok_or_else(|| {
        EtlError::ResultsContainerNotFound("フィードコンテナが見つかりません".into())
    })?;

    info!("Found results feed, starting to scroll...");
    let script = scroll_script(feed_selector);

    for i in 0..iterations {
        debug!("Scroll attempt {}/{}", i + 1, iterations);
        if let Err(e) = page.evaluate(script.as_str()).await {
            // スクロール失敗は追加読み込みの機会損失でしかない
            debug!("Scroll evaluate failed: {}", e);
        }
        sleep(delay).await;
    }

    info!("Finished scrolling");
    Ok(())
}

/// 結果カードを列挙する
///
/// チェーンの先頭から試し、1件以上マッチした最初のセレクタを採用する。
/// どれにもマッチしない場合は空（正当な「結果なし」）を返す。
pub async fn enumerate_cards(page: &Page) -> Vec<Element> {
    for selector in CARD_SELECTORS {
        let cards = page.find_elements(*selector).await.unwrap_or_default();
        if !cards.is_empty() {
            info!("Found {} place cards with selector: {}", cards.len(), selector);
            return cards;
        }
    }

    warn!("No place cards found with any selector");
    Vec::new()
}
