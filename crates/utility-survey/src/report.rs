//! JSON analysis report

use crate::error::CliError;
use serde::Serialize;
use std::io::Write;
use utility_survey_lib::{
    DatasetInfo, LineState, LineTerrain, MatchReport, ProfileSample, TerrainStatsSnapshot,
    ValidationReport,
};

/// Everything the CLI found out about a dataset
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub dataset: DatasetInfo,
    pub matching: MatchSummary,
    /// Absent when no rule set was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    /// Absent when no elevation service was configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terrain: Option<TerrainSection>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub required: usize,
    pub matched: usize,
    pub missing: usize,
    pub orphans: usize,
    #[serde(flatten)]
    pub details: MatchReport,
}

impl From<MatchReport> for MatchSummary {
    fn from(report: MatchReport) -> Self {
        Self {
            required: report.required_count(),
            matched: report.matched_count(),
            missing: report.missing_count(),
            orphans: report.orphan_count(),
            details: report,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerrainSection {
    pub lines: Vec<LineTerrainReport>,
    pub stats: TerrainStatsSnapshot,
}

/// Terrain outcome of one line
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineTerrainReport {
    pub index: usize,
    pub line_id: String,
    pub state: LineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_cover_depth: Option<f64>,
    pub missing_terrain: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<ProfileSample>>,
}

impl LineTerrainReport {
    pub fn new(
        index: usize,
        line_id: impl Into<String>,
        state: LineState,
        terrain: Option<&LineTerrain>,
        include_samples: bool,
    ) -> Self {
        Self {
            index,
            line_id: line_id.into(),
            state,
            min_cover_depth: terrain.and_then(LineTerrain::min_cover_depth),
            missing_terrain: terrain.map_or(0, LineTerrain::missing_terrain),
            samples: terrain
                .filter(|_| include_samples)
                .map(|terrain| terrain.samples.clone()),
        }
    }
}

impl AnalysisReport {
    /// Serialize the report as JSON followed by a newline
    pub fn write_to<W: Write>(&self, mut writer: W, pretty: bool) -> Result<(), CliError> {
        if pretty {
            serde_json::to_writer_pretty(&mut writer, self)?;
        } else {
            serde_json::to_writer(&mut writer, self)?;
        }
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}
