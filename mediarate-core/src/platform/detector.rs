use serde::{Deserialize, Serialize};

use crate::browser::{BrowserResult, PageSession};

/// Soft-block markers for one platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRules {
    #[serde(default)]
    pub selectors: Vec<String>,
    #[serde(default)]
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimited {
    pub phrase: String,
    pub selector: Option<String>,
}

/// First configured phrase found in `text`. Phrases in a cased script
/// compare case-insensitively, CJK phrases must match exactly.
pub fn find_phrase<'a>(text: &str, phrases: &'a [String]) -> Option<&'a str> {
    let lowered = text.to_lowercase();
    phrases
        .iter()
        .filter(|phrase| !phrase.is_empty())
        .find(|phrase| {
            if phrase.chars().any(is_cjk) {
                text.contains(phrase.as_str())
            } else {
                lowered.contains(&phrase.to_lowercase())
            }
        })
        .map(String::as_str)
}

fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{3040}'..='\u{30ff}'   // kana
        | '\u{3400}'..='\u{4dbf}'
        | '\u{4e00}'..='\u{9fff}'
        | '\u{ac00}'..='\u{d7af}' // hangul
        | '\u{f900}'..='\u{faff}'
        | '\u{20000}'..='\u{2fa1f}')
}

/// Decides whether the loaded page is a soft block. Full page text is checked
/// first, then the text of each configured selector.
pub async fn detect_rate_limit(
    session: &dyn PageSession,
    rules: &RateLimitRules,
) -> BrowserResult<Option<RateLimited>> {
    if rules.phrases.is_empty() {
        return Ok(None);
    }
    let body = session.body_text().await?;
    if let Some(phrase) = find_phrase(&body, &rules.phrases) {
        return Ok(Some(RateLimited {
            phrase: phrase.to_string(),
            selector: None,
        }));
    }
    for selector in &rules.selectors {
        if let Some(text) = session.select_text(selector).await? {
            if let Some(phrase) = find_phrase(&text, &rules.phrases) {
                return Ok(Some(RateLimited {
                    phrase: phrase.to_string(),
                    selector: Some(selector.clone()),
                }));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn latin_phrases_ignore_case() {
        let rules = phrases(&["Too Many Requests"]);
        assert_eq!(
            find_phrase("error: too many requests, slow down", &rules),
            Some("Too Many Requests")
        );
    }

    #[test]
    fn accented_phrases_ignore_case() {
        let rules = phrases(&["Accès refusé"]);
        assert_eq!(
            find_phrase("ERREUR 403 : ACCÈS REFUSÉ", &rules),
            Some("Accès refusé")
        );
        assert!(find_phrase("accès autorisé", &rules).is_none());
    }

    #[test]
    fn non_latin_phrases_are_exact() {
        let rules = phrases(&["检测到有异常请求"]);
        assert!(find_phrase("检测到有异常请求从你的 IP 发出", &rules).is_some());
        assert!(find_phrase("检测到异常", &rules).is_none());
    }

    #[test]
    fn first_configured_phrase_wins() {
        let rules = phrases(&["access denied", "rate limit"]);
        assert_eq!(
            find_phrase("Rate limit hit. Access Denied.", &rules),
            Some("access denied")
        );
        assert_eq!(find_phrase("", &rules), None);
    }

    #[test]
    fn empty_phrases_never_match() {
        let rules = phrases(&[""]);
        assert_eq!(find_phrase("anything", &rules), None);
    }
}
