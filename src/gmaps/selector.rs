//! セレクタチェーン解決
//!
//! UIの頻繁な変更に耐えるため、1つの意味フィールドに対して複数の
//! ロケータ戦略を順序付きで持ち、先頭から順に試して最初に非空の
//! テキストを返したものを採用する。全滅した場合は呼び出し側の
//! センチネル値にフォールバックする。

use std::time::Duration;

use chromiumoxide::Page;
use tokio::time::sleep;
use tracing::{debug, trace};

/// チェーン全体を再試行するポーリング間隔
const POLL_INTERVAL_MS: u64 = 250;

/// 要素ロケータ戦略
///
/// いずれもDOMを読むだけの純粋なプローブとしてJS式にコンパイルされる。
/// プローブは「文字列またはnull」を返す。
#[derive(Debug, Clone, PartialEq)]
pub enum Locator {
    /// CSSセレクタで要素を探し、trim済みtextContentを返す
    Text(&'static str),
    /// CSSセレクタで要素を探し、指定属性（またはプロパティ）値を返す
    Attr(&'static str, &'static str),
    /// 任意のJS式（文字列またはnullを返すこと）
    Script(&'static str),
}

impl Locator {
    /// ロケータをJSプローブ式に変換する
    pub fn probe_script(&self) -> String {
        match self {
            Locator::Text(css) => format!(
                r#"(() => {{
                    const el = document.querySelector({css});
                    if (!el) return null;
                    const text = (el.textContent || '').trim();
                    return text.length > 0 ? text : null;
                }})()"#,
                css = js_string(css)
            ),
            Locator::Attr(css, attr) => format!(
                r#"(() => {{
                    const el = document.querySelector({css});
                    if (!el) return null;
                    const attr = {attr};
                    const value = el.getAttribute(attr) !== null ? el.getAttribute(attr) : (el[attr] || '');
                    const text = String(value).trim();
                    return text.length > 0 ? text : null;
                }})()"#,
                css = js_string(css),
                attr = js_string(attr)
            ),
            Locator::Script(js) => (*js).to_string(),
        }
    }
}

/// 文字列をJS文字列リテラルにエスケープする
pub(crate) fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| String::from("null"))
}

/// ロケータチェーンを順に試し、最初に得られた非空テキストを返す
///
/// タイムアウトまでチェーン全体を繰り返しポーリングする。評価エラーは
/// ミスとして扱い、決してエラーを返さない（フィールド欠損はカード全体を
/// 中断させない）。
pub async fn resolve(page: &Page, locators: &[Locator], timeout: Duration) -> Option<String> {
    let start = std::time::Instant::now();

    loop {
        for locator in locators {
            let script = locator.probe_script();
            match page.evaluate(script.as_str()).await {
                Ok(result) => {
                    let value = result.into_value::<Option<String>>().unwrap_or(None);
                    if let Some(text) = value {
                        let text = text.trim().to_string();
                        if !text.is_empty() {
                            trace!("Locator hit: {:?}", locator);
                            return Some(text);
                        }
                    }
                }
                Err(e) => {
                    // 評価エラーはミス扱い
                    debug!("Locator probe error ({:?}): {}", locator, e);
                }
            }
        }

        if start.elapsed() >= timeout {
            return None;
        }
        sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }
}

/// チェーン全滅時にセンチネル値へフォールバックする解決
pub async fn resolve_or(
    page: &Page,
    locators: &[Locator],
    timeout: Duration,
    sentinel: &str,
) -> String {
    match resolve(page, locators, timeout).await {
        Some(text) => text,
        None => {
            debug!("All locators missed, using sentinel: {}", sentinel);
            sentinel.to_string()
        }
    }
}

/// ベストエフォートなUI操作の結果
///
/// インタースティシャルの消去や共有パネルの閉鎖など、失敗しても
/// 処理を継続する操作の結果。助言的な情報であり、エラーとして
/// 伝播されることはない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advisory {
    /// 操作を実行できた
    Applied,
    /// 対象が存在しない等で実行しなかった
    NotApplied,
}

impl Advisory {
    pub fn applied(&self) -> bool {
        matches!(self, Advisory::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_probe_embeds_escaped_selector() {
        let script = Locator::Text("input[name='q']").probe_script();
        assert!(script.contains(r#"document.querySelector("input[name='q']")"#));
        assert!(script.contains("textContent"));
    }

    #[test]
    fn test_attr_probe_reads_attribute_and_property() {
        let script = Locator::Attr("input[readonly]", "value").probe_script();
        assert!(script.contains(r#""input[readonly]""#));
        assert!(script.contains(r#""value""#));
        assert!(script.contains("getAttribute"));
    }

    #[test]
    fn test_script_probe_passes_through() {
        let js = "(() => null)()";
        assert_eq!(Locator::Script(js).probe_script(), js);
    }

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string(r#"a"b"#), r#""a\"b""#);
        assert_eq!(js_string("a'b"), r#""a'b""#);
    }

    #[test]
    fn test_advisory_is_not_an_error() {
        assert!(Advisory::Applied.applied());
        assert!(!Advisory::NotApplied.applied());
    }
}
