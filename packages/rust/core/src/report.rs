//! Plain-text rendering of a [`PipelineResult`].

use std::fmt::Write;

use absorber_shared::{ConflictKind, ConflictRecord, PipelineResult};

const RULE_WIDTH: usize = 80;

/// Render entries in input order, then a `CONFLICTS` section when there is
/// something to compare and something was found.
pub fn render_text(result: &PipelineResult) -> String {
    let mut out = String::new();

    for (i, entry) in result.entries.iter().enumerate() {
        out.push_str(&separator(i + 1, &entry.raw));
        out.push('\n');
        let text = entry.outcome.text();
        out.push_str(text);
        if !text.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }

    if result.entries.len() >= 2 && !result.conflicts.is_empty() {
        out.push_str(&rule("CONFLICTS"));
        out.push('\n');
        for conflict in &result.conflicts {
            out.push_str(&conflict_line(conflict));
            out.push('\n');
        }
    }

    out
}

fn separator(index: usize, raw: &str) -> String {
    rule(&format!("[{index}] {raw}"))
}

/// `==== <label> ` padded with `=` to the rule width.
fn rule(label: &str) -> String {
    let mut line = format!("==== {label} ");
    let used = line.chars().count();
    if used < RULE_WIDTH {
        line.push_str(&"=".repeat(RULE_WIDTH - used));
    }
    line
}

fn conflict_line(conflict: &ConflictRecord) -> String {
    let mut line = match conflict.kind {
        ConflictKind::Numeric => format!("- {}: values differ:", conflict.subject),
        ConflictKind::Sentiment => format!("- {}: sentiment differs:", conflict.subject),
    };
    for (n, (source, value)) in conflict.per_source.iter().enumerate() {
        let sep = if n == 0 { " " } else { ", " };
        let _ = write!(line, "{sep}[{}] {value}", source + 1);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use absorber_shared::{Input, InputEntry, InputOutcome};

    fn failed(raw: &str, message: &str) -> InputEntry {
        InputEntry {
            raw: raw.into(),
            input: Input::LocalPath(raw.into()),
            outcome: InputOutcome::Failed {
                message: message.into(),
            },
        }
    }

    fn conflict() -> ConflictRecord {
        ConflictRecord {
            kind: ConflictKind::Numeric,
            subject: "Throughput".into(),
            per_source: BTreeMap::from([(0, "500".to_string()), (1, "800".to_string())]),
        }
    }

    #[test]
    fn separators_are_padded_to_width() {
        let result = PipelineResult {
            entries: vec![failed("a.pdf", "[NOT FOUND: a.pdf]")],
            conflicts: vec![],
        };
        let text = render_text(&result);
        let first = text.lines().next().unwrap();

        assert!(first.starts_with("==== [1] a.pdf ="));
        assert_eq!(first.chars().count(), 80);
        assert!(text.contains("[NOT FOUND: a.pdf]\n"));
    }

    #[test]
    fn long_labels_are_not_truncated() {
        let raw = format!("https://example.com/{}", "p".repeat(100));
        assert_eq!(separator(3, &raw), format!("==== [3] {raw} "));
    }

    #[test]
    fn conflicts_section_with_one_based_sources() {
        let result = PipelineResult {
            entries: vec![failed("a", "x"), failed("b", "y")],
            conflicts: vec![conflict()],
        };
        let text = render_text(&result);

        assert!(text.contains("==== CONFLICTS ="));
        assert!(text.ends_with("- Throughput: values differ: [1] 500, [2] 800\n"));
    }

    #[test]
    fn single_input_never_lists_conflicts() {
        let result = PipelineResult {
            entries: vec![failed("a", "x")],
            conflicts: vec![conflict()],
        };
        assert!(!render_text(&result).contains("CONFLICTS"));
    }
}
