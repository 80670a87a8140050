//! Source material collection: PDFs, web links and a local files directory.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::io::config::SourcesConfig;

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)\s*>")
        .expect("script regex should be valid")
});

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex should be valid"));

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex should be valid"));

static SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\f\v]+").expect("space regex should be valid"));

static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n+").expect("blank line regex should be valid"));

/// What the operator handed in for a topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRequest {
    pub topic: String,
    pub pdfs: Vec<PathBuf>,
    pub links: Vec<String>,
    pub files_dir: Option<PathBuf>,
}

/// Extracted text per source kind; empty strings when nothing was usable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMaterial {
    pub pdf_content: String,
    pub link_content: String,
    pub files_content: String,
}

impl SourceMaterial {
    pub fn is_empty(&self) -> bool {
        self.pdf_content.trim().is_empty()
            && self.link_content.trim().is_empty()
            && self.files_content.trim().is_empty()
    }
}

/// Retrieval backend for raw source material.
pub trait SourceCollector {
    /// Collect material; individual unreadable items are skipped, not fatal.
    fn collect(&self, request: &SourceRequest) -> Result<SourceMaterial>;
}

pub struct LocalSourceCollector {
    config: SourcesConfig,
    client: reqwest::blocking::Client,
}

impl LocalSourceCollector {
    pub fn new(config: SourcesConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.link_timeout_secs))
            .user_agent(concat!("lab/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self { config, client })
    }

    fn collect_pdfs(&self, paths: &[PathBuf]) -> String {
        let mut parts = Vec::new();
        for path in paths {
            match pdf_extract::extract_text(path) {
                Ok(text) if !text.trim().is_empty() => {
                    parts.push(format!("--- {} ---\n{}", path.display(), text.trim()));
                }
                Ok(_) => warn!(path = %path.display(), "pdf has no extractable text"),
                Err(e) => warn!(path = %path.display(), err = %e, "failed to extract pdf text"),
            }
        }
        parts.join("\n\n")
    }

    fn collect_links(&self, links: &[String]) -> String {
        let mut parts = Vec::new();
        for url in links {
            match self.fetch_link(url) {
                Ok(text) if !text.is_empty() => parts.push(format!("--- {url} ---\n{text}")),
                Ok(_) => warn!(%url, "link has no readable text"),
                Err(e) => warn!(%url, err = %format!("{e:#}"), "failed to fetch link"),
            }
        }
        parts.join("\n\n")
    }

    fn fetch_link(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("get {url}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("get {url} returned {status}"));
        }
        let body = response.text().with_context(|| format!("read body of {url}"))?;
        Ok(html_to_text(&body))
    }

    fn collect_files(&self, dir: &Path) -> String {
        let mut parts = Vec::new();
        let mut entries: Vec<_> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(err = %e, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| self.is_allowed(entry.path()))
            .collect();
        entries.sort_by(|a, b| a.path().cmp(b.path()));

        for entry in entries {
            let path = entry.path();
            match read_prefix(path, self.config.max_file_bytes) {
                Ok(text) if !text.trim().is_empty() => {
                    let shown = path.strip_prefix(dir).unwrap_or(path);
                    parts.push(format!("--- {} ---\n{}", shown.display(), text.trim()));
                }
                Ok(_) => debug!(path = %path.display(), "skipping empty file"),
                Err(e) => warn!(path = %path.display(), err = %format!("{e:#}"), "failed to read file"),
            }
        }
        parts.join("\n\n")
    }

    fn is_allowed(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.config
                    .file_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }
}

impl SourceCollector for LocalSourceCollector {
    #[instrument(skip_all, fields(pdfs = request.pdfs.len(), links = request.links.len()))]
    fn collect(&self, request: &SourceRequest) -> Result<SourceMaterial> {
        let material = SourceMaterial {
            pdf_content: self.collect_pdfs(&request.pdfs),
            link_content: self.collect_links(&request.links),
            files_content: match &request.files_dir {
                Some(dir) if dir.is_dir() => self.collect_files(dir),
                Some(dir) => {
                    warn!(dir = %dir.display(), "files directory does not exist");
                    String::new()
                }
                None => String::new(),
            },
        };
        debug!(
            pdf_bytes = material.pdf_content.len(),
            link_bytes = material.link_content.len(),
            files_bytes = material.files_content.len(),
            "sources collected"
        );
        Ok(material)
    }
}

/// Read at most `limit` bytes of a file as lossy UTF-8.
fn read_prefix(path: &Path, limit: usize) -> Result<String> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut buf = Vec::new();
    file.take(limit as u64)
        .read_to_end(&mut buf)
        .with_context(|| format!("read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Reduce an HTML page to readable text.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, " ");
    let text = COMMENT_RE.replace_all(&text, " ");
    let text = TAG_RE.replace_all(&text, "\n");
    let text = decode_entities(&text);
    let text = SPACE_RE.replace_all(&text, " ");
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let joined = lines.join("\n");
    BLANK_LINES_RE.replace_all(&joined, "\n").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn html_is_reduced_to_text() {
        let html = "<html><head><style>p{color:red}</style><script>var a = '<b>';</script></head>\
                    <body><h1>Gene&nbsp;editing</h1><!-- nav --><p>CRISPR &amp; base   editors</p>\
                    <p>Tom &quot;said&quot; &lt;hi&gt;</p></body></html>";
        assert_eq!(
            html_to_text(html),
            "Gene editing\nCRISPR & base editors\nTom \"said\" <hi>"
        );
    }

    #[test]
    fn files_dir_reads_allowed_extensions_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir(temp.path().join("nested")).expect("mkdir");
        fs::write(temp.path().join("b.md"), "beta notes").expect("write");
        fs::write(temp.path().join("nested").join("a.txt"), "alpha notes").expect("write");
        fs::write(temp.path().join("image.png"), [0u8, 1, 2]).expect("write");

        let collector = LocalSourceCollector::new(SourcesConfig::default()).expect("collector");
        let material = collector
            .collect(&SourceRequest {
                topic: "t".to_string(),
                files_dir: Some(temp.path().to_path_buf()),
                ..SourceRequest::default()
            })
            .expect("collect");

        let files = material.files_content;
        assert!(files.contains("--- b.md ---\nbeta notes"));
        assert!(files.contains("alpha notes"));
        assert!(!files.contains("image.png"));
        assert!(files.find("b.md").expect("b") < files.find("alpha").expect("a"));
    }

    #[test]
    fn files_are_capped_at_max_bytes() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("long.txt"), "0123456789").expect("write");
        let collector = LocalSourceCollector::new(SourcesConfig {
            max_file_bytes: 4,
            ..SourcesConfig::default()
        })
        .expect("collector");
        let text = collector.collect_files(temp.path());
        assert!(text.ends_with("0123"));
    }

    #[test]
    fn unreadable_inputs_are_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let collector = LocalSourceCollector::new(SourcesConfig::default()).expect("collector");
        let material = collector
            .collect(&SourceRequest {
                topic: "t".to_string(),
                pdfs: vec![temp.path().join("missing.pdf")],
                links: Vec::new(),
                files_dir: Some(temp.path().join("absent")),
            })
            .expect("collect");
        assert!(material.is_empty());
    }
}
