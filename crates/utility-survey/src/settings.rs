use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use utility_survey_lib::{MatcherConfig, SchedulerConfig};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Utility Survey - Lid matching, attribute validation and terrain correlation for utility survey datasets
pub struct Settings {
    /// Parsed survey dataset (JSON)
    #[clap(value_name = "DATASET", env = "SURVEY_DATASET")]
    pub dataset: PathBuf,

    /// Validation rule set (JSON with pointRules and lineRules)
    #[clap(short, long, value_name = "FILE", env = "SURVEY_SCHEMA")]
    pub schema: Option<PathBuf>,

    /// Base URL of the elevation service; terrain correlation is skipped without it
    #[clap(short, long, value_name = "URL", env = "SURVEY_ELEVATION_URL")]
    pub elevation_url: Option<String>,

    /// Distance between profile points, in CRS units
    #[clap(long, default_value = "1.0", env = "SURVEY_SPACING")]
    pub spacing: f64,

    /// Pause between lines while fetching terrain, in milliseconds
    #[clap(long, default_value = "10")]
    pub yield_ms: u64,

    /// Line ids fetched before all others (comma separated)
    #[clap(short, long, value_name = "ID", value_delimiter = ',')]
    pub priority_lines: Vec<String>,

    /// Write the report to this file instead of stdout
    #[clap(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Pretty-print the JSON report
    #[clap(long, default_value = "false")]
    pub pretty: bool,

    /// Include every profile sample in the terrain section of the report
    #[clap(long, default_value = "false")]
    pub include_samples: bool,

    /// Type codes of features that must have a lid (comma separated)
    #[clap(long, value_name = "CODE", value_delimiter = ',')]
    pub requires_lid: Vec<String>,

    /// Type codes of lid features (comma separated)
    #[clap(long, value_name = "CODE", value_delimiter = ',')]
    pub lid_codes: Vec<String>,

    /// Minimum lid matching distance in meters
    #[clap(long)]
    pub base_tolerance: Option<f64>,

    /// Lower feature radius bound in meters
    #[clap(long)]
    pub min_radius: Option<f64>,

    /// Upper feature radius bound in meters
    #[clap(long)]
    pub max_radius: Option<f64>,
}

impl Settings {
    /// Matcher configuration with command line overrides applied
    pub fn matcher_config(&self) -> MatcherConfig {
        let mut config = MatcherConfig::default();
        if !self.requires_lid.is_empty() {
            config.requires_lid = self.requires_lid.iter().cloned().collect();
        }
        if !self.lid_codes.is_empty() {
            config.lid_codes = self.lid_codes.iter().cloned().collect();
        }
        if let Some(base_tolerance) = self.base_tolerance {
            config.base_tolerance = base_tolerance;
        }
        if let Some(min_radius) = self.min_radius {
            config.min_radius = min_radius;
        }
        if let Some(max_radius) = self.max_radius {
            config.max_radius = max_radius;
        }
        config
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            spacing: self.spacing,
            yield_interval: Duration::from_millis(self.yield_ms),
        }
    }
}
