//! Code payload extraction from raw model output.
//!
//! The scan is asymmetric: the first opening fence and the last fence in the
//! text bound the payload, so stray fences inside the explanation or between
//! several blocks are captured instead of truncating the program.

use std::sync::LazyLock;

use regex::Regex;

const FENCE: &str = "```";

static FENCE_LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[\w+#.-]*").expect("fence regex should be valid"));

static INLINE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w+#.-]+[ \t]+").expect("inline tag regex should be valid"));

/// Extract the code payload from `text`.
///
/// Falls back to the whole trimmed input when there is no opening fence that
/// precedes a distinct closing fence.
pub fn extract_code(text: &str) -> String {
    let payload = match fenced_span(text) {
        Some((start, end)) => &text[start..end],
        None => text,
    };
    strip_fence_literals(payload.trim())
}

/// Byte range between the end of the first fence line and the last fence.
fn fenced_span(text: &str) -> Option<(usize, usize)> {
    let open = text.find(FENCE)?;
    let close = text.rfind(FENCE)?;
    if open >= close {
        return None;
    }
    // Skip the language tag on the opening fence line.
    let after_open = open + FENCE.len();
    let inner = &text[after_open..close];
    let body_start = match inner.find('\n') {
        Some(offset) => after_open + offset + 1,
        // Single-line fence: the tag is the first token when whitespace follows it.
        None => after_open + INLINE_TAG_RE.find(inner).map_or(0, |m| m.end()),
    };
    Some((body_start, close))
}

fn strip_fence_literals(payload: &str) -> String {
    if !payload.contains(FENCE) {
        return payload.to_string();
    }
    FENCE_LITERAL_RE
        .replace_all(payload, "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_fenced_block() {
        let text = "Here is the script:\n```python\nprint('hi')\nx = 1\n```\nRun it with python.";
        assert_eq!(extract_code(text), "print('hi')\nx = 1");
    }

    #[test]
    fn untagged_fence_is_supported() {
        let text = "```\necho ok\n```";
        assert_eq!(extract_code(text), "echo ok");
    }

    #[test]
    fn single_line_fence_drops_language_tag() {
        assert_eq!(extract_code("```python print(1)```"), "print(1)");
        assert_eq!(extract_code("```print(1)```"), "print(1)");
    }

    #[test]
    fn no_fence_returns_trimmed_input() {
        let text = "\n\nimport os\nprint(os.getcwd())\n  ";
        assert_eq!(extract_code(text), "import os\nprint(os.getcwd())");
    }

    #[test]
    fn single_fence_marker_falls_back_to_whole_text() {
        let text = "```python\nprint(1)";
        assert_eq!(extract_code(text), "print(1)");
    }

    #[test]
    fn stray_fences_use_first_open_and_last_close() {
        let text = "Use ```pip install numpy``` first.\n\
                    ```python\nimport numpy as np\n```\n\
                    and then\n```python\nprint(np.ones(3))\n```\nDone.";
        let code = extract_code(text);
        assert!(code.contains("import numpy as np"));
        assert!(code.contains("print(np.ones(3))"));
        assert!(code.contains("and then"));
        assert!(!code.contains("```"));
        assert!(!code.contains("Done."));
    }

    #[test]
    fn whitespace_only_payload_extracts_empty() {
        assert_eq!(extract_code("```python\n   \n```"), "");
        assert_eq!(extract_code("   \n\t"), "");
    }
}
