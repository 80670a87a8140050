//! Folding reviewer, critic and operator feedback into improvement input.

use crate::core::types::ExecutionResult;

/// Feedback carried into the next code improvement after a failed or declined run.
///
/// Reviewer text comes first, then the operator's own words (if any).
pub fn fold_failure_feedback(review: &str, result: &ExecutionResult) -> String {
    let mut sections = Vec::new();
    if !review.trim().is_empty() {
        sections.push(review.trim().to_string());
    }
    match result {
        ExecutionResult::Declined { reason } => {
            let reason = reason
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .unwrap_or("no reason given");
            sections.push(format!(
                "Operator feedback:\nThe operator declined to run this code. Reason: {reason}"
            ));
        }
        other => {
            if let Some(feedback) = other.operator_feedback() {
                sections.push(format!("Operator feedback:\n{}", feedback.trim()));
            }
        }
    }
    if sections.is_empty() {
        return format!(
            "The code did not run successfully:\n{}",
            result.render().trim()
        );
    }
    sections.join("\n\n")
}

/// Feedback carried forward after a successful run when iteration continues.
pub fn fold_success_feedback(review: &str, critique: &str) -> String {
    [review.trim(), critique.trim()]
        .into_iter()
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Append operator free text to reviewer feedback for a satisfied-check refusal.
pub fn with_operator_request(review: &str, request: &str) -> String {
    let request = request.trim();
    if request.is_empty() {
        return review.trim().to_string();
    }
    format!("{}\n\nOperator feedback:\n{request}", review.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FailureKind;

    #[test]
    fn failure_feedback_includes_review_and_operator_text() {
        let result = ExecutionResult::failure(FailureKind::RuntimeError, "ZeroDivisionError")
            .with_operator_feedback(Some("guard the denominator".to_string()));
        let folded = fold_failure_feedback("Check line 3.", &result);
        assert!(folded.starts_with("Check line 3."));
        assert!(folded.contains("Operator feedback:\nguard the denominator"));
    }

    #[test]
    fn decline_without_reason_is_explicit() {
        let folded = fold_failure_feedback("", &ExecutionResult::Declined { reason: None });
        assert!(folded.contains("declined"));
        assert!(folded.contains("no reason given"));
    }

    #[test]
    fn empty_review_falls_back_to_result_text() {
        let result = ExecutionResult::failure(FailureKind::NoCodeDetected, "no valid code detected");
        let folded = fold_failure_feedback("  ", &result);
        assert!(!folded.trim().is_empty());
        assert!(folded.contains("no valid code detected"));
    }

    #[test]
    fn success_feedback_skips_empty_parts() {
        assert_eq!(fold_success_feedback("", "tidy up"), "tidy up");
        assert_eq!(fold_success_feedback("a", "b"), "a\n\nb");
    }
}
