// src/ingest/normalize.rs
//! Text cleanup applied to every incoming feedback item before it is scored.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::record::Language;

/// Mail-client signatures, removed wherever they appear.
const SIGNATURES: &[&str] = &[
    r"发送自\s*iPhone",
    r"Sent from my iPhone",
    r"发送自\s*我的\s*\w+手机",
];

/// Footer lines, removed only when they start a line; the rest of that line goes with them.
const FOOTERS: &[&str] = &[
    r"获取\s*Outlook",
    r"Get Outlook for\b",
    r"此邮件.*保密",
    r"This email\b.*\bconfidential\b",
    r"版权所有\s*(?:©|\(c\)|\d{4}|[:：])",
    r"Copyright\s*(?:©|\(c\)|\d{4}|:)",
    r"免责声明\s*[:：]",
    r"Disclaimer\s*:",
];

const STOPWORDS: &[&str] = &[
    "的", "了", "是", "在", "有", "和", "对", "我", "你", "他", "她", "它", "the", "is", "at",
    "which", "on", "and", "a", "an", "as", "are", "was", "were", "been", "be", "have", "has",
    "had", "do", "does", "did", "will", "would", "could", "should", "may", "might", "must",
];

fn boilerplate_res() -> &'static [Regex] {
    static RES: OnceCell<Vec<Regex>> = OnceCell::new();
    RES.get_or_init(|| {
        let signatures = SIGNATURES.iter().map(|p| format!("(?i){p}"));
        let footers = FOOTERS.iter().map(|p| format!(r"(?im)^[ \t]*{p}.*$"));
        signatures
            .chain(footers)
            .map(|p| Regex::new(&p).unwrap())
            .collect()
    })
}

/// Result of the cleanup pass: the text plus a log of what happened to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub text: String,
    pub steps: Vec<String>,
}

/// Decode entities, strip markup and boilerplate, collapse whitespace, cap punctuation runs.
pub fn normalize_text(s: &str) -> Normalized {
    let mut steps = vec![format!("original length: {}", s.chars().count())];

    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();
    steps.push(format!("after markup: {}", out.chars().count()));

    // 3) Boilerplate signatures and footers
    for re in boilerplate_res() {
        out = re.replace_all(&out, "").to_string();
    }
    steps.push(format!("after boilerplate: {}", out.chars().count()));

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Punctuation runs of 4+ capped at 3
    out = cap_punctuation_runs(&out);
    steps.push(format!("final length: {}", out.chars().count()));

    Normalized { text: out, steps }
}

fn cap_punctuation_runs(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev: Option<char> = None;
    let mut run = 0usize;
    for c in s.chars() {
        if Some(c) == prev {
            run += 1;
        } else {
            prev = Some(c);
            run = 1;
        }
        if matches!(c, '!' | '?' | '.') && run > 3 {
            continue;
        }
        out.push(c);
    }
    out
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// `zh` when more than 30% of chars are CJK, `en` when more than half are ASCII letters.
pub fn detect_language(text: &str) -> Language {
    let total = text.chars().count();
    if total == 0 {
        return Language::Unknown;
    }
    let cjk = text.chars().filter(|c| is_cjk(*c)).count();
    let latin = text.chars().filter(|c| c.is_ascii_alphabetic()).count();
    if cjk as f64 / total as f64 > 0.3 {
        Language::Zh
    } else if latin as f64 / total as f64 > 0.5 {
        Language::En
    } else {
        Language::Unknown
    }
}

/// First ten tokens longer than two chars that are not stopwords.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && !STOPWORDS.contains(w))
        .take(10)
        .map(str::to_string)
        .collect()
}

/// Longest run of one repeated character.
pub(crate) fn longest_char_run(text: &str) -> usize {
    let mut best = 0usize;
    let mut run = 0usize;
    let mut prev: Option<char> = None;
    for c in text.chars() {
        run = if Some(c) == prev { run + 1 } else { 1 };
        prev = Some(c);
        best = best.max(run);
    }
    best
}

pub(crate) fn has_letter_or_cjk(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_alphabetic() || is_cjk(c))
}

/// All cased characters are uppercase and at least one exists.
pub(crate) fn is_all_upper(text: &str) -> bool {
    let mut cased = false;
    for c in text.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            cased = true;
        }
    }
    cased
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_entities_and_whitespace() {
        let n = normalize_text("  <p>Login &amp; sync</p>\n\n<b>broken</b>  ");
        assert_eq!(n.text, "Login & sync broken");
        assert_eq!(n.steps.len(), 4);
    }

    #[test]
    fn removes_signatures() {
        let n = normalize_text("The export button does nothing. Sent from my iPhone");
        assert_eq!(n.text, "The export button does nothing.");
        let n = normalize_text("同步总是失败 发送自 iPhone");
        assert_eq!(n.text, "同步总是失败");
    }

    #[test]
    fn footers_only_match_at_line_start() {
        let n = normalize_text("The disclaimer page crashes on save");
        assert_eq!(n.text, "The disclaimer page crashes on save");
        let n = normalize_text("Copyright notice overlaps the login form");
        assert_eq!(n.text, "Copyright notice overlaps the login form");
        let n = normalize_text("Sync drops my edits.\nCopyright 2024 Acme Inc.\n  Disclaimer: not legal advice");
        assert_eq!(n.text, "Sync drops my edits.");
        let n = normalize_text("导出失败\n版权所有 © 某公司");
        assert_eq!(n.text, "导出失败");
    }

    #[test]
    fn caps_punctuation_runs_at_three() {
        assert_eq!(normalize_text("why?????? ok!!!!").text, "why??? ok!!!");
        assert_eq!(normalize_text("wait...").text, "wait...");
    }

    #[test]
    fn language_ratios() {
        assert_eq!(detect_language("应用一直闪退，请尽快修复"), Language::Zh);
        assert_eq!(detect_language("the app keeps crashing"), Language::En);
        assert_eq!(detect_language("12345 !!!"), Language::Unknown);
        assert_eq!(detect_language(""), Language::Unknown);
    }

    #[test]
    fn keywords_skip_short_and_stopwords() {
        let k = extract_keywords("The app is SLOW, and it crashes on the settings page!");
        assert_eq!(k, vec!["app", "slow", "crashes", "settings", "page"]);
    }

    #[test]
    fn helpers() {
        assert_eq!(longest_char_run("aaabbbbbbc"), 6);
        assert!(is_all_upper("THIS IS BROKEN 123"));
        assert!(!is_all_upper("123 !!!"));
        assert!(has_letter_or_cjk("好"));
        assert!(!has_letter_or_cjk("123 ?!"));
    }
}
