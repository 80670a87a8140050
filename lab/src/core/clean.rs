//! Report cleaning: turns raw model output into plain report prose.
//!
//! Removes `<think>...</think>` spans, strips ATX header markers while keeping
//! the header text, drops horizontal-rule lines and trims the result.
//! `clean_report(clean_report(x)) == clean_report(x)` for every input.

use std::sync::LazyLock;

use regex::Regex;

static THINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("think regex should be valid"));

// Leading whitespace is consumed so that a final trim can never expose a new header.
static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:#+[ \t]*)+").expect("header regex should be valid")
});

static RULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*-{3,}[ \t\r]*(?:\n|$)").expect("rule regex should be valid")
});

/// Clean raw report text.
pub fn clean_report(raw: &str) -> String {
    let without_thoughts = strip_think_spans(raw);
    let without_headers = HEADER_RE.replace_all(&without_thoughts, "");
    let without_rules = RULE_RE.replace_all(&without_headers, "");
    without_rules.trim().to_string()
}

/// Remove think spans until none remain; removing one span can join the
/// halves of an enclosing pair.
fn strip_think_spans(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = THINK_RE.replace_all(&current, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}
