//! Per-run artifact directory: reports, code, execution results, critiques.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use docx_rs::{Docx, Paragraph, Run};
use tracing::{debug, info};

use crate::core::types::RoundRecord;
use crate::io::llm::Telemetry;

/// Destination for everything a run produces.
pub trait ArtifactSink {
    fn persist_round(&self, record: &RoundRecord) -> Result<()>;
    fn persist_telemetry(&self, telemetry: &Telemetry) -> Result<()>;
    fn persist_quick_search(&self, topic: &str, answer: &str) -> Result<()>;
}

/// Timestamped directory `<output_dir>/run_<YYYYmmdd_HHMMSS>/`.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    dir: PathBuf,
    code_extension: String,
}

impl RunArtifacts {
    /// Create the run directory. `script_name` decides the code file extension.
    pub fn create(output_dir: &Path, script_name: &str) -> Result<Self> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let dir = output_dir.join(format!("run_{stamp}"));
        fs::create_dir_all(&dir).with_context(|| format!("create run dir {}", dir.display()))?;
        info!(dir = %dir.display(), "artifacts directory ready");
        let code_extension = Path::new(script_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("txt")
            .to_string();
        Ok(Self {
            dir,
            code_extension,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_text(&self, name: &str, contents: &str) -> Result<()> {
        let path = self.dir.join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), bytes = contents.len(), "artifact written");
        Ok(())
    }

    fn write_report(&self, number: u32, report: &str) -> Result<()> {
        let path = self.dir.join(format!("research_report_round_{number}.docx"));
        let heading = Run::new()
            .add_text(format!("Research Report - Round {number}"))
            .bold()
            .size(32);
        let mut docx = Docx::new().add_paragraph(Paragraph::new().add_run(heading));
        for line in report.lines() {
            docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)));
        }
        let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        docx.build()
            .pack(file)
            .map_err(|e| anyhow!("pack docx {}: {e}", path.display()))?;
        debug!(path = %path.display(), "report written");
        Ok(())
    }
}

impl ArtifactSink for RunArtifacts {
    fn persist_round(&self, record: &RoundRecord) -> Result<()> {
        let number = record.round + 1;
        if let Some(report) = &record.report {
            self.write_report(number, report)?;
        }
        if let Some(code) = &record.code {
            self.write_text(&format!("code_round_{number}.{}", self.code_extension), code)?;
        }
        if let Some(execution) = &record.execution {
            self.write_text(
                &format!("execution_result_round_{number}.txt"),
                &execution.render(),
            )?;
        }
        self.write_text(&format!("critique_round_{number}.txt"), &record.summary)
    }

    fn persist_telemetry(&self, telemetry: &Telemetry) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(telemetry).context("serialize telemetry")?;
        buf.push('\n');
        self.write_text("telemetry.json", &buf)
    }

    fn persist_quick_search(&self, topic: &str, answer: &str) -> Result<()> {
        self.write_text(
            "quick_search.txt",
            &format!("Topic: {}\n\n{}\n", topic.trim(), answer.trim()),
        )
    }
}
