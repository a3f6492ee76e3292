//! Rule-based document classification.
//!
//! Derives a document's type, category, language, extractive summary,
//! keywords, structured fields and importance from its file name, size,
//! modification time and extracted text. Everything here is deterministic
//! and offline; no model is consulted.
//!
//! # Importance
//!
//! ```text
//! importance = 1.0
//!            × type weight × category weight
//!            × 1.1  if size > 100 KB
//!            × 1.2  if modified within 30 days, × 0.9 if older than a year
//!            × 1.1  if more than 3 structured fields were extracted
//! clamped to [0.1, 2.0]
//! ```
//!
//! Routine, high-volume documents (invoices) weigh less than rare,
//! high-value ones (certificates), so ranking does not drown the latter.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::models::ExtractedData;

pub const MIN_IMPORTANCE: f64 = 0.1;
pub const MAX_IMPORTANCE: f64 = 2.0;

const LARGE_FILE_BYTES: u64 = 100 * 1024;
const SUMMARY_CHARS: usize = 300;
const MAX_KEYWORDS: usize = 10;

/// What the classifier needs to know about a file besides its text.
#[derive(Debug, Clone)]
pub struct DocumentFacts<'a> {
    pub path: &'a str,
    pub file_size: u64,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub document_type: String,
    pub category: String,
    pub language: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub extracted_data: ExtractedData,
    pub importance: f64,
}

struct Rule {
    document_type: &'static str,
    category: &'static str,
    terms: &'static [&'static str],
    /// When non-empty, at least one of these must also be present.
    qualifiers: &'static [&'static str],
}

const INVOICE_TERMS: &[&str] = &[
    "invoice",
    "rechnung",
    "amount due",
    "bill to",
    "zahlbar bis",
    "rechnungsbetrag",
];
const TELECOM_TERMS: &[&str] = &[
    "telecom",
    "telekom",
    "telecommunication",
    "telekommunikation",
    "vodafone",
    "mobilfunk",
    "mobile plan",
    "data plan",
    "roaming",
    "phone bill",
    "telefon",
    "broadband",
];
const CERTIFICATE_TERMS: &[&str] = &[
    "certificate",
    "certification",
    "zertifikat",
    "bescheinigung",
    "licence",
    "license",
    "lizenz",
];
const AVIATION_TERMS: &[&str] = &[
    "aviation",
    "luftfahrt",
    "pilot",
    "drone",
    "drohne",
    "aircraft",
    "luftfahrzeug",
    "flight",
    "easa",
];

/// Ordered; the first matching rule wins. Telecom invoices come before
/// generic invoices so they can be told apart at all.
const RULES: &[Rule] = &[
    Rule {
        document_type: "invoice",
        category: "telecommunications",
        terms: INVOICE_TERMS,
        qualifiers: TELECOM_TERMS,
    },
    Rule {
        document_type: "invoice",
        category: "financial",
        terms: INVOICE_TERMS,
        qualifiers: &[],
    },
    Rule {
        document_type: "contract",
        category: "legal",
        terms: &["contract", "agreement", "vertrag", "vereinbarung", "terms and conditions"],
        qualifiers: &[],
    },
    Rule {
        document_type: "certificate",
        category: "aviation",
        terms: CERTIFICATE_TERMS,
        qualifiers: AVIATION_TERMS,
    },
    Rule {
        document_type: "certificate",
        category: "legal",
        terms: CERTIFICATE_TERMS,
        qualifiers: &[],
    },
    Rule {
        document_type: "report",
        category: "technical",
        terms: &["report", "bericht", "analysis", "analyse", "findings"],
        qualifiers: &[],
    },
    Rule {
        document_type: "letter",
        category: "correspondence",
        terms: &[
            "dear ",
            "sincerely",
            "kind regards",
            "sehr geehrte",
            "mit freundlichen grüßen",
        ],
        qualifiers: &[],
    },
    Rule {
        document_type: "minutes",
        category: "administrative",
        terms: &["minutes", "protokoll", "meeting notes", "sitzung", "agenda"],
        qualifiers: &[],
    },
];

pub fn type_weight(document_type: &str) -> f64 {
    match document_type {
        "certificate" => 1.5,
        "contract" => 1.3,
        "report" => 1.1,
        "minutes" => 1.0,
        "letter" => 0.9,
        "invoice" => 0.8,
        _ => 1.0,
    }
}

pub fn category_weight(category: &str) -> f64 {
    match category {
        "aviation" => 1.5,
        "legal" => 1.2,
        "technical" => 1.1,
        "administrative" => 1.0,
        "telecommunications" => 1.0,
        "correspondence" => 0.9,
        "financial" => 0.9,
        _ => 1.0,
    }
}

/// Classify a document as of now.
pub fn classify(facts: &DocumentFacts<'_>, content: &str) -> Classification {
    classify_at(facts, content, Utc::now())
}

/// Classify a document with recency measured against `now`.
pub fn classify_at(facts: &DocumentFacts<'_>, content: &str, now: DateTime<Utc>) -> Classification {
    let (document_type, category) = document_kind(facts.path, content);
    let extracted_data = extract_fields(content, document_type);
    let importance = importance(document_type, category, facts, extracted_data.len(), now);

    Classification {
        document_type: document_type.to_string(),
        category: category.to_string(),
        language: detect_language(content).to_string(),
        summary: summarize(content),
        keywords: keywords(content),
        extracted_data,
        importance,
    }
}

/// One compiled pattern per rule: its terms, and its qualifiers if any.
static RULE_PATTERNS: LazyLock<Vec<(Regex, Option<Regex>)>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|r| {
            let qualifiers = (!r.qualifiers.is_empty()).then(|| term_pattern(r.qualifiers));
            (term_pattern(r.terms), qualifiers)
        })
        .collect()
});

/// Matches any of `terms` that starts or ends a word: "invoice" finds
/// "invoices", "vertrag" finds "mietvertrag", "easa" skips "pleasant".
fn term_pattern(terms: &[&str]) -> Regex {
    let alternatives = terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{0})|(?:{0})\b", alternatives)).expect("valid regex")
}

/// `(document_type, category)` from the first rule whose terms appear in the
/// file name or content.
pub fn document_kind(path: &str, content: &str) -> (&'static str, &'static str) {
    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().replace(['_', '-', '.'], " "))
        .unwrap_or_default();
    let haystack = format!("{} \n{}", file_name, content).to_lowercase();

    RULES
        .iter()
        .zip(RULE_PATTERNS.iter())
        .find(|(_, (terms, qualifiers))| {
            terms.is_match(&haystack) && qualifiers.as_ref().is_none_or(|q| q.is_match(&haystack))
        })
        .map(|(r, _)| (r.document_type, r.category))
        .unwrap_or(("generic", "general"))
}

fn importance(
    document_type: &str,
    category: &str,
    facts: &DocumentFacts<'_>,
    field_count: usize,
    now: DateTime<Utc>,
) -> f64 {
    let mut score = 1.0 * type_weight(document_type) * category_weight(category);

    if facts.file_size > LARGE_FILE_BYTES {
        score *= 1.1;
    }

    let age = now.signed_duration_since(facts.modified_at);
    if age < Duration::days(30) {
        score *= 1.2;
    } else if age > Duration::days(365) {
        score *= 0.9;
    }

    if field_count > 3 {
        score *= 1.1;
    }

    score.clamp(MIN_IMPORTANCE, MAX_IMPORTANCE)
}

const ENGLISH_MARKERS: &[&str] = &[
    "the", "and", "is", "are", "of", "to", "with", "for", "this", "that", "was", "you",
];
const GERMAN_MARKERS: &[&str] = &[
    "der", "die", "das", "und", "ist", "sind", "nicht", "mit", "für", "ein", "eine", "von", "zu",
    "sie",
];

/// `"en"`, `"de"`, or `"unknown"` on a tie (including no markers at all).
pub fn detect_language(content: &str) -> &'static str {
    let mut en = 0usize;
    let mut de = 0usize;
    for word in content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        if ENGLISH_MARKERS.contains(&word.as_str()) {
            en += 1;
        }
        if GERMAN_MARKERS.contains(&word.as_str()) {
            de += 1;
        }
    }
    match en.cmp(&de) {
        std::cmp::Ordering::Greater => "en",
        std::cmp::Ordering::Less => "de",
        std::cmp::Ordering::Equal => "unknown",
    }
}

static SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.!?]+(?:[.!?]+|$)").expect("valid regex"));

/// Leading sentences up to about 300 characters. A longer first sentence is
/// cut at the character budget.
pub fn summarize(content: &str) -> String {
    let normalized = content.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut summary = String::new();

    for m in SENTENCE.find_iter(&normalized) {
        let sentence = m.as_str().trim();
        if sentence.is_empty() {
            continue;
        }
        let needed = if summary.is_empty() {
            sentence.chars().count()
        } else {
            summary.chars().count() + 1 + sentence.chars().count()
        };
        if needed > SUMMARY_CHARS {
            if summary.is_empty() {
                summary = sentence.chars().take(SUMMARY_CHARS).collect::<String>().trim_end().to_string();
            }
            break;
        }
        if !summary.is_empty() {
            summary.push(' ');
        }
        summary.push_str(sentence);
    }

    summary
}

const STOP_WORDS: &[&str] = &[
    // English
    "that", "this", "with", "from", "have", "will", "your", "been", "were", "they", "their",
    "there", "which", "what", "when", "where", "would", "could", "should", "about", "into",
    "than", "then", "them", "these", "those", "also", "only", "other", "some", "such", "more",
    "most", "very", "each", "over", "under", "after", "before", "because", "while", "being",
    "does", "here", "just", "please", "shall",
    // German
    "eine", "einer", "eines", "einem", "einen", "nicht", "sind", "auch", "oder", "aber", "wird",
    "werden", "wurde", "dass", "sich", "noch", "nach", "durch", "über", "unter", "diese",
    "dieser", "dieses", "haben", "hatte", "kann", "können", "sein", "seine", "ihre", "ihrer",
    "ihnen", "wenn", "dann", "denn", "bitte", "sowie", "beim", "mehr", "alle", "allen", "wir",
    "uns", "unser", "unsere",
];

/// Top ten content words by frequency, ties broken by first occurrence.
pub fn keywords(content: &str) -> Vec<String> {
    let cleaned: String = content
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, word) in cleaned.split_whitespace().enumerate() {
        if word.chars().count() <= 3 || STOP_WORDS.contains(&word) {
            continue;
        }
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> =
        counts.into_iter().map(|(w, (n, first))| (w, n, first)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(|(w, _, _)| w.to_string())
        .collect()
}

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|januar|februar|märz|mai|juni|juli|oktober|dezember";

static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:\d{{4}}-\d{{2}}-\d{{2}}|\d{{1,2}}[./]\d{{1,2}}[./]\d{{2,4}}|\d{{1,2}}\.?\s+(?:{m})\s+\d{{4}}|(?:{m})\s+\d{{1,2}},?\s+\d{{4}})\b",
        m = MONTHS
    ))
    .expect("valid regex")
});
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:[$€£]\s?\d{1,3}(?:[.,']\d{3})*(?:[.,]\d{1,2})?|\b\d{1,3}(?:[.,']\d{3})*(?:[.,]\d{1,2})?\s?(?:€|eur\b|usd\b|gbp\b|chf\b|\$|£))")
        .expect("valid regex")
});
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid regex")
});
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}|\b0)[\d\s/()-]{6,18}\d").expect("valid regex")
});
static INVOICE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:invoice|rechnung)(?:\s*(?:no\.?|number|nr\.?|nummer|#))?[\s:#-]*([A-Z0-9][A-Z0-9/-]{3,})")
        .expect("valid regex")
});
static CERTIFICATE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:certificate|zertifikat|licen[cs]e|lizenz)(?:\s*(?:no\.?|number|nr\.?|nummer|#))?[\s:#-]*([A-Z0-9][A-Z0-9./-]{3,})")
        .expect("valid regex")
});

/// Regex extraction of dates, amounts, emails and phone numbers, plus
/// invoice or certificate numbers for those document types. Only non-empty
/// fields are present in the map.
pub fn extract_fields(content: &str, document_type: &str) -> ExtractedData {
    let mut data = ExtractedData::new();

    let mut put = |key: &str, values: Vec<String>| {
        let mut unique: Vec<String> = Vec::new();
        for v in values {
            if !unique.contains(&v) {
                unique.push(v);
            }
        }
        if !unique.is_empty() {
            data.insert(key.to_string(), unique);
        }
    };

    put("dates", matches(&DATE, content));
    put("amounts", matches(&AMOUNT, content));
    put("emails", matches(&EMAIL, content));
    put(
        "phones",
        matches(&PHONE, content)
            .into_iter()
            .filter(|p| p.chars().filter(|c| c.is_ascii_digit()).count() >= 7)
            .collect(),
    );

    match document_type {
        "invoice" => put("invoice_numbers", captures_with_digit(&INVOICE_NUMBER, content)),
        "certificate" => put(
            "certificate_numbers",
            captures_with_digit(&CERTIFICATE_NUMBER, content),
        ),
        _ => {}
    }

    data
}

fn matches(re: &Regex, content: &str) -> Vec<String> {
    re.find_iter(content)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

fn captures_with_digit(re: &Regex, content: &str) -> Vec<String> {
    re.captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', '-', '/']).to_string())
        .filter(|s| s.chars().any(|c| c.is_ascii_digit()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn facts(path: &str, size: u64, age_days: i64) -> DocumentFacts<'_> {
        DocumentFacts {
            path,
            file_size: size,
            modified_at: now() - Duration::days(age_days),
        }
    }

    #[test]
    fn telecom_invoice_is_reachable_before_generic_invoice() {
        assert_eq!(
            document_kind("bill.pdf", "Vodafone invoice for your mobile plan"),
            ("invoice", "telecommunications")
        );
        assert_eq!(
            document_kind("bill.pdf", "Invoice for consulting services"),
            ("invoice", "financial")
        );
    }

    #[test]
    fn certificate_with_aviation_terms_is_aviation() {
        assert_eq!(
            document_kind("cert.pdf", "Remote pilot certificate issued under EASA rules"),
            ("certificate", "aviation")
        );
        assert_eq!(
            document_kind("cert.pdf", "Certificate of completion"),
            ("certificate", "legal")
        );
    }

    #[test]
    fn file_name_alone_can_decide() {
        assert_eq!(
            document_kind("/docs/Meeting_Minutes_2024.txt", "Attendees: Anna, Ben."),
            ("minutes", "administrative")
        );
        assert_eq!(document_kind("notes.txt", "nothing special"), ("generic", "general"));
    }

    #[test]
    fn german_markers_classify_too() {
        assert_eq!(
            document_kind("x.txt", "Rechnung der Telekom für Mobilfunk"),
            ("invoice", "telecommunications")
        );
        assert_eq!(document_kind("x.txt", "Mietvertrag"), ("contract", "legal"));
    }

    #[test]
    fn rule_terms_do_not_match_inside_words() {
        assert_eq!(
            document_kind("cert.pdf", "Certificate of attendance for a pleasant workshop"),
            ("certificate", "legal")
        );
        assert_eq!(
            document_kind("cert.pdf", "Certificates for both drones attached"),
            ("certificate", "aviation")
        );
    }

    #[test]
    fn recent_telecom_invoice_importance() {
        let c = classify_at(
            &facts("march.txt", 2_000, 3),
            "Telecom invoice for the mobile plan.",
            now(),
        );
        assert_eq!(c.document_type, "invoice");
        assert_eq!(c.category, "telecommunications");
        assert!((c.importance - 0.96).abs() < 1e-9, "got {}", c.importance);
    }

    #[test]
    fn aviation_certificate_is_clamped_to_max() {
        let c = classify_at(
            &facts("license.pdf", 200_000, 1),
            "Remote pilot certificate for drone operations.",
            now(),
        );
        assert_eq!(c.category, "aviation");
        assert_eq!(c.importance, MAX_IMPORTANCE);
    }

    #[test]
    fn old_letter_is_weighted_down() {
        let c = classify_at(
            &facts("letter.txt", 500, 800),
            "Dear Sir, thank you for your note. Sincerely, Ann.",
            now(),
        );
        assert_eq!(c.document_type, "letter");
        // 0.9 type × 0.9 category × 0.9 age
        assert!((c.importance - 0.729).abs() < 1e-9, "got {}", c.importance);
    }

    #[test]
    fn importance_stays_in_bounds() {
        let samples = [
            ("a.txt", "invoice", 10, 900),
            ("b.txt", "pilot certificate", 500_000, 1),
            ("c.txt", "plain words", 0, 100),
            ("d.txt", "Dear team, minutes attached", 1_000_000, 2),
        ];
        for (path, text, size, age) in samples {
            let c = classify_at(&facts(path, size, age), text, now());
            assert!((MIN_IMPORTANCE..=MAX_IMPORTANCE).contains(&c.importance));
        }
    }

    #[test]
    fn language_detection() {
        assert_eq!(detect_language("This is the report of the year and it is good"), "en");
        assert_eq!(detect_language("Das ist der Bericht und die Zahlen sind gut"), "de");
        assert_eq!(detect_language("12345 67890"), "unknown");
        assert_eq!(detect_language("the der"), "unknown");
    }

    #[test]
    fn keywords_rank_by_frequency_then_first_occurrence() {
        let text = "Drone flight log. Drone battery check! The battery, the drone, the wind.";
        let kws = keywords(text);
        assert_eq!(kws[0], "drone");
        assert_eq!(kws[1], "battery");
        assert_eq!(kws[2], "flight");
        assert!(!kws.contains(&"the".to_string()));
        assert!(!kws.contains(&"log".to_string()));
    }

    #[test]
    fn keywords_are_capped_at_ten() {
        let text = (0..30).map(|i| format!("keyword{:02}", i)).collect::<Vec<_>>().join(" ");
        assert_eq!(keywords(&text).len(), 10);
    }

    #[test]
    fn summary_takes_leading_sentences() {
        let text = "First sentence here. Second one follows!  Third?";
        assert_eq!(summarize(text), "First sentence here. Second one follows! Third?");

        let long = format!("{}. Next.", "word ".repeat(100));
        let summary = summarize(&long);
        assert!(summary.chars().count() <= 300);
        assert!(summary.starts_with("word word"));

        let many = "A fairly ordinary sentence of moderate length. ".repeat(20);
        let summary = summarize(&many);
        assert!(summary.chars().count() <= 300);
        assert!(summary.ends_with('.'));
    }

    #[test]
    fn extracts_structured_fields() {
        let text = "Invoice No. INV-2024-0042 dated 2024-03-15. Total: €1.234,56 \
                    (also 99.00 EUR). Contact billing@telco.example or +49 30 1234567.";
        let data = extract_fields(text, "invoice");
        assert_eq!(data["invoice_numbers"], vec!["INV-2024-0042"]);
        assert_eq!(data["dates"], vec!["2024-03-15"]);
        assert!(data["amounts"].contains(&"€1.234,56".to_string()));
        assert!(data["amounts"].contains(&"99.00 EUR".to_string()));
        assert_eq!(data["emails"], vec!["billing@telco.example"]);
        assert_eq!(data["phones"], vec!["+49 30 1234567"]);
    }

    #[test]
    fn invoice_number_needs_a_digit() {
        let data = extract_fields("Invoice from Telecom", "invoice");
        assert!(!data.contains_key("invoice_numbers"));
    }

    #[test]
    fn certificate_numbers_only_for_certificates() {
        let text = "Certificate number DE.UAS.123456 issued 01.02.2024";
        let cert = extract_fields(text, "certificate");
        assert_eq!(cert["certificate_numbers"], vec!["DE.UAS.123456"]);
        assert_eq!(cert["dates"], vec!["01.02.2024"]);
        assert!(!extract_fields(text, "report").contains_key("certificate_numbers"));
    }
}
