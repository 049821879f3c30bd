//! Cross-source conflict heuristics.
//!
//! Two deterministic passes over the normalized bodies: a numeric one
//! (first numeral shortly after a metric word) and a sentiment one
//! (polarity words around a named product). Both are wordlist heuristics;
//! identical inputs always give identical records.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use absorber_shared::{ConflictConfig, ConflictKind, ConflictRecord};

const POSITIVE_WORDS: &[&str] = &[
    "fast", "faster", "fastest", "best", "better", "excellent", "great", "good", "reliable",
    "scalable", "efficient", "recommended", "robust", "impressive", "superior", "outperforms",
    "strong", "easy", "stable",
];

const NEGATIVE_WORDS: &[&str] = &[
    "slow", "slower", "slowest", "worst", "worse", "poor", "bad", "unreliable", "expensive",
    "limited", "difficult", "lacks", "struggles", "crashes", "inferior", "weak", "unstable",
    "bottleneck", "painful",
];

static NUMERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)*").expect("valid regex"));

static POSITIVE: LazyLock<Regex> = LazyLock::new(|| word_list(POSITIVE_WORDS));
static NEGATIVE: LazyLock<Regex> = LazyLock::new(|| word_list(NEGATIVE_WORDS));

fn word_list(words: &[&str]) -> Regex {
    Regex::new(&format!(r"(?i)\b(?:{})\b", words.join("|"))).expect("valid regex")
}

/// A conflict detection strategy over ordered source texts.
///
/// `texts[i]` is the body of input `i`; failed inputs are passed as empty
/// strings so indices stay aligned with the batch.
pub trait ConflictStrategy: Send + Sync {
    fn detect(&self, texts: &[String]) -> Vec<ConflictRecord>;
}

struct Subject {
    name: String,
    pattern: Regex,
}

/// Default wordlist strategy.
pub struct HeuristicDetector {
    numeric: Vec<Subject>,
    sentiment: Vec<Subject>,
    lookahead: usize,
    window: usize,
}

impl HeuristicDetector {
    pub fn new(config: &ConflictConfig) -> Self {
        Self {
            numeric: compile_subjects(&config.numeric_subjects),
            sentiment: compile_subjects(&config.sentiment_subjects),
            lookahead: config.numeric_lookahead_chars,
            window: config.sentiment_window_chars,
        }
    }

    fn numeric_conflicts(&self, texts: &[String], out: &mut Vec<ConflictRecord>) {
        for subject in &self.numeric {
            let values: Vec<Option<(String, String)>> = texts
                .iter()
                .map(|text| self.numeral_after(subject, text))
                .collect();

            for i in 0..values.len() {
                let Some((raw_i, norm_i)) = &values[i] else {
                    continue;
                };
                for j in (i + 1)..values.len() {
                    let Some((raw_j, norm_j)) = &values[j] else {
                        continue;
                    };
                    if norm_i != norm_j {
                        out.push(ConflictRecord {
                            kind: ConflictKind::Numeric,
                            subject: subject.name.clone(),
                            per_source: BTreeMap::from([(i, raw_i.clone()), (j, raw_j.clone())]),
                        });
                    }
                }
            }
        }
    }

    /// First numeral within the lookahead after the subject's first
    /// occurrence, as `(as written, normalized)`.
    fn numeral_after(&self, subject: &Subject, text: &str) -> Option<(String, String)> {
        let found = subject.pattern.find(text)?;
        let tail = &text[found.end()..];
        let tail = &tail[..byte_offset(tail, self.lookahead)];
        let numeral = NUMERAL.find(tail)?.as_str();
        Some((numeral.to_string(), normalize_numeral(numeral)))
    }

    fn sentiment_conflicts(&self, texts: &[String], out: &mut Vec<ConflictRecord>) {
        for subject in &self.sentiment {
            let mut per_source = BTreeMap::new();
            for (index, text) in texts.iter().enumerate() {
                if let Some(polarity) = self.polarity_near(subject, text) {
                    per_source.insert(index, polarity.to_string());
                }
            }

            let mut distinct: Vec<&String> = per_source.values().collect();
            distinct.sort();
            distinct.dedup();
            if per_source.len() >= 2 && distinct.len() >= 2 {
                out.push(ConflictRecord {
                    kind: ConflictKind::Sentiment,
                    subject: subject.name.clone(),
                    per_source,
                });
            }
        }
    }

    fn polarity_near(&self, subject: &Subject, text: &str) -> Option<&'static str> {
        let found = subject.pattern.find(text)?;
        let before = &text[..found.start()];
        let start = before.len() - byte_offset_back(before, self.window);
        let after = &text[found.end()..];
        let end = found.end() + byte_offset(after, self.window);
        let window = &text[start..end];

        let positive = POSITIVE.find_iter(window).count() as i64;
        let negative = NEGATIVE.find_iter(window).count() as i64;
        let score = positive - negative;
        match score.signum() {
            1 => Some("positive"),
            -1 => Some("negative"),
            _ => None,
        }
    }
}

impl ConflictStrategy for HeuristicDetector {
    fn detect(&self, texts: &[String]) -> Vec<ConflictRecord> {
        let mut records = Vec::new();
        self.numeric_conflicts(texts, &mut records);
        self.sentiment_conflicts(texts, &mut records);
        debug!(sources = texts.len(), conflicts = records.len(), "conflict detection done");
        records
    }
}

fn compile_subjects(names: &[String]) -> Vec<Subject> {
    names
        .iter()
        .filter(|name| !name.trim().is_empty())
        .filter_map(|name| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(name.trim()));
            match Regex::new(&pattern) {
                Ok(pattern) => Some(Subject {
                    name: name.trim().to_string(),
                    pattern,
                }),
                Err(e) => {
                    warn!(subject = %name, error = %e, "skipping conflict subject");
                    None
                }
            }
        })
        .collect()
}

/// Byte length of the first `chars` characters of `s`.
fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len())
}

/// Byte length of the last `chars` characters of `s`.
fn byte_offset_back(s: &str, chars: usize) -> usize {
    if chars == 0 {
        return 0;
    }
    s.char_indices()
        .rev()
        .nth(chars - 1)
        .map(|(i, _)| s.len() - i)
        .unwrap_or(s.len())
}

/// `1,000` and `1000` compare equal.
fn normalize_numeral(raw: &str) -> String {
    let digits = raw.replace(',', "");
    match digits.parse::<f64>() {
        Ok(value) => value.to_string(),
        Err(_) => digits,
    }
}
