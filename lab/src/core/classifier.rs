//! Deterministic classification of successful-looking program output.

/// Default substrings that mark a run as failed even when it exits with 0.
pub const DEFAULT_FAILURE_INDICATORS: &[&str] = &[
    "error",
    "traceback",
    "exception",
    "module not found",
    "modulenotfounderror",
    "no module named",
];

/// Return the first failure indicator found in `output` (case-insensitive).
///
/// This is a substring heuristic: legitimate output such as an `error_rate`
/// column also matches.
pub fn find_failure_indicator<'a, S: AsRef<str>>(
    output: &str,
    indicators: &'a [S],
) -> Option<&'a str> {
    let haystack = output.to_lowercase();
    indicators
        .iter()
        .map(|indicator| indicator.as_ref())
        .filter(|needle| !needle.trim().is_empty())
        .find(|needle| haystack.contains(&needle.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_output_has_no_indicator() {
        assert_eq!(
            find_failure_indicator("Result: 42\nall good", DEFAULT_FAILURE_INDICATORS),
            None
        );
    }

    #[test]
    fn traceback_in_stdout_is_detected() {
        let out = "Result: 42\nTraceback (most recent call last): ...";
        assert_eq!(
            find_failure_indicator(out, DEFAULT_FAILURE_INDICATORS),
            Some("traceback")
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        let indicators = vec!["Fatal".to_string()];
        assert_eq!(find_failure_indicator("FATAL: disk", &indicators), Some("Fatal"));
    }

    #[test]
    fn known_false_positive_on_column_names() {
        assert_eq!(
            find_failure_indicator("mean error_rate=0.02", DEFAULT_FAILURE_INDICATORS),
            Some("error")
        );
    }

    #[test]
    fn blank_indicators_are_ignored() {
        let indicators = vec![String::new(), "  ".to_string()];
        assert_eq!(find_failure_indicator("anything", &indicators), None);
    }
}
