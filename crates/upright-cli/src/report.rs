//! Per-image outcomes and the optional JSON run report.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    Saved,
    NoFace,
    Unreadable,
    Failed,
}

/// What happened to one input file.
#[derive(Debug, Clone, Serialize)]
pub struct ImageOutcome {
    pub file: String,
    pub status: ImageStatus,
    /// Applied rotation in degrees (0, 90, -90 or 180).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub composited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub saved: usize,
    pub no_face: usize,
    pub unreadable: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn skipped(&self) -> usize {
        self.no_face + self.unreadable
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub summary: RunSummary,
    pub images: Vec<ImageOutcome>,
}

impl RunReport {
    pub fn record(&mut self, outcome: ImageOutcome) {
        match outcome.status {
            ImageStatus::Saved => self.summary.saved += 1,
            ImageStatus::NoFace => self.summary.no_face += 1,
            ImageStatus::Unreadable => self.summary.unreadable += 1,
            ImageStatus::Failed => self.summary.failed += 1,
        }
        self.images.push(outcome);
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("creating report file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).context("serializing run report")?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
