//! HTML/XML to plain text.

use regex::Regex;
use std::sync::LazyLock;

static SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid regex"));
static STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").expect("valid regex"));
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").expect("valid regex"));

/// Strip scripts, styles, comments and tags, decode common entities, and
/// collapse runs of whitespace to single spaces.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT.replace_all(html, " ");
    let text = STYLE.replace_all(&text, " ");
    let text = COMMENT.replace_all(&text, " ");
    let text = TAG.replace_all(&text, " ");
    let text = decode_entities(&text);
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Contents of the first `<title>` element, if any.
pub fn html_title(html: &str) -> Option<String> {
    TITLE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| WHITESPACE.replace_all(&decode_entities(m.as_str()), " ").trim().to_string())
        .filter(|t| !t.is_empty())
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_styles_and_tags() {
        let html = r#"<html><head><title>Quarterly  Report</title>
            <style>body { color: red; }</style>
            <script type="text/javascript">var secret = 1;</script></head>
            <body><h1>Results</h1><!-- hidden --><p>Revenue &amp; costs<br/>grew.</p></body></html>"#;
        let text = html_to_text(html);
        assert!(!text.contains("secret"));
        assert!(!text.contains("color"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains('<'));
        assert!(text.contains("Results Revenue & costs grew."));
        assert_eq!(html_title(html).as_deref(), Some("Quarterly Report"));
    }

    #[test]
    fn missing_title_is_none() {
        assert_eq!(html_title("<p>no title here</p>"), None);
        assert_eq!(html_title("<title>  </title>"), None);
    }
}
