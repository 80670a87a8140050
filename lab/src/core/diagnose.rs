//! Missing-dependency diagnosis and package-name resolution heuristics.

use std::sync::LazyLock;

use regex::Regex;

static MISSING_MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"No module named ['"]?([A-Za-z_][\w.\-]*)['"]?"#)
        .expect("missing module regex should be valid")
});

/// Import names whose installable distribution has a different name.
const PACKAGE_ALIASES: &[(&str, &str)] = &[
    ("Bio", "biopython"),
    ("PIL", "Pillow"),
    ("bs4", "beautifulsoup4"),
    ("cv2", "opencv-python"),
    ("dateutil", "python-dateutil"),
    ("docx", "python-docx"),
    ("dotenv", "python-dotenv"),
    ("fitz", "PyMuPDF"),
    // Lookups use the top-level segment, so `google.protobuf` arrives as `google`.
    ("google", "protobuf"),
    ("igraph", "python-igraph"),
    ("Levenshtein", "python-Levenshtein"),
    ("skimage", "scikit-image"),
    ("sklearn", "scikit-learn"),
    ("yaml", "pyyaml"),
];

/// Extract missing top-level module names from interpreter stderr.
///
/// Names are deduplicated and keep their first-seen order.
pub fn detect_missing_modules(stderr: &str) -> Vec<String> {
    let mut modules: Vec<String> = Vec::new();
    for caps in MISSING_MODULE_RE.captures_iter(stderr) {
        let full = caps[1].trim_end_matches(['.', '-']);
        let top = full.split('.').next().unwrap_or(full).to_string();
        if !top.is_empty() && !modules.contains(&top) {
            modules.push(top);
        }
    }
    modules
}

/// Static import-name to package-name mapping; `None` when unknown.
pub fn known_package_for(module: &str) -> Option<&'static str> {
    PACKAGE_ALIASES
        .iter()
        .find(|(import, _)| *import == module)
        .map(|(_, package)| *package)
}

/// Reduce a free-form model answer to a single installable package name.
///
/// Takes the first token that looks like a distribution name, dropping
/// backticks, quotes and a leading `pip install`.
pub fn sanitize_package_name(answer: &str) -> Option<String> {
    let cleaned = answer.replace(['`', '"', '\''], " ");
    let mut tokens = cleaned.split_whitespace().peekable();
    while let Some(token) = tokens.peek() {
        if token.eq_ignore_ascii_case("pip") || token.eq_ignore_ascii_case("install") {
            tokens.next();
        } else {
            break;
        }
    }
    let token = tokens.next()?;
    let valid = token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '[' | ']' | ','));
    valid.then(|| token.trim_end_matches(['.', ',']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_module_not_found() {
        let stderr = "Traceback (most recent call last):\n  File \"temp_code.py\", line 1\n\
                      ModuleNotFoundError: No module named 'foo'";
        assert_eq!(detect_missing_modules(stderr), vec!["foo".to_string()]);
    }

    #[test]
    fn reduces_submodules_and_deduplicates() {
        let stderr = "No module named 'sklearn.ensemble'\nNo module named 'sklearn'\n\
                      ImportError: No module named yaml";
        assert_eq!(
            detect_missing_modules(stderr),
            vec!["sklearn".to_string(), "yaml".to_string()]
        );
    }

    #[test]
    fn no_match_yields_empty() {
        assert!(detect_missing_modules("ZeroDivisionError: division by zero").is_empty());
    }

    #[test]
    fn static_aliases_resolve() {
        assert_eq!(known_package_for("sklearn"), Some("scikit-learn"));
        assert_eq!(known_package_for("numpy"), None);
    }

    #[test]
    fn namespaced_protobuf_import_maps_to_protobuf() {
        let modules =
            detect_missing_modules("ModuleNotFoundError: No module named 'google.protobuf'");
        assert_eq!(modules, vec!["google".to_string()]);
        assert_eq!(known_package_for(&modules[0]), Some("protobuf"));
    }

    #[test]
    fn sanitizes_model_answers() {
        assert_eq!(
            sanitize_package_name("`pip install scikit-learn`"),
            Some("scikit-learn".to_string())
        );
        assert_eq!(
            sanitize_package_name("opencv-python\nbecause cv2 ships there"),
            Some("opencv-python".to_string())
        );
        assert_eq!(sanitize_package_name("   "), None);
        assert_eq!(sanitize_package_name("rm -rf /; echo"), Some("rm".to_string()));
        assert_eq!(sanitize_package_name("$(curl x)"), None);
    }
}
