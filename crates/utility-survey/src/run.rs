//! Analysis pipeline: load inputs, run every analysis, assemble the report

use crate::error::CliError;
use crate::report::{AnalysisReport, LineTerrainReport, TerrainSection};
use crate::settings::Settings;
use std::fs::File;
use std::io::BufWriter;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use utility_survey_lib::terrain::HttpElevationService;
use utility_survey_lib::{
    Dataset, ElevationService, FeatureRef, RuleSet, Scalar, TerrainScheduler, ValidationSchema,
    match_lids, validate_dataset,
};

/// Install the log subscriber
///
/// Logs go to stderr so the report on stdout stays machine readable. `RUST_LOG` overrides
/// the default `info` level.
pub fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the inputs named by the settings and analyze them
pub async fn run(settings: &Settings) -> Result<AnalysisReport, CliError> {
    if !(settings.spacing.is_finite() && settings.spacing > 0.0) {
        return Err(CliError::InvalidSpacing(settings.spacing));
    }

    let dataset = Dataset::load(&settings.dataset).map_err(|source| CliError::Load {
        path: settings.dataset.clone(),
        source,
    })?;
    let info = dataset.info();
    info!(
        points = info.point_count,
        lines = info.line_count,
        epsg = info.epsg,
        "Loaded dataset {}",
        settings.dataset.display()
    );

    let rules = settings
        .schema
        .as_ref()
        .map(|path| {
            RuleSet::load(path).map_err(|source| CliError::Load {
                path: path.clone(),
                source,
            })
        })
        .transpose()?;

    let service = settings
        .elevation_url
        .as_deref()
        .map(HttpElevationService::new);

    analyze(&dataset, rules, settings, service).await
}

/// Write the report to the configured output
pub fn write_report(report: &AnalysisReport, settings: &Settings) -> Result<(), CliError> {
    match &settings.output {
        Some(path) => {
            let file = File::create(path)?;
            report.write_to(BufWriter::new(file), settings.pretty)?;
            info!("Report written to {}", path.display());
        }
        None => report.write_to(std::io::stdout().lock(), settings.pretty)?,
    }
    Ok(())
}

/// Run every analysis on an in-memory dataset
pub async fn analyze<S: ElevationService>(
    dataset: &Dataset,
    rules: Option<RuleSet>,
    settings: &Settings,
    service: Option<S>,
) -> Result<AnalysisReport, CliError> {
    let matching = match_lids(dataset, &settings.matcher_config());
    for m in matching.matches.iter().filter(|m| !m.is_ok()) {
        debug!(point = %m.point_id, "Missing lid");
    }
    info!(
        required = matching.required_count(),
        matched = matching.matched_count(),
        orphans = matching.orphan_count(),
        "Lid matching done"
    );

    let validation = rules.map(|rules| {
        let report = validate_dataset(dataset, &builtin_schema(rules));
        info!(errors = report.total_errors, "Validation done");
        report
    });

    let terrain = match service {
        Some(service) => Some(correlate_terrain(dataset, settings, service).await?),
        None => {
            info!("No elevation service configured, skipping terrain correlation");
            None
        }
    };

    Ok(AnalysisReport {
        dataset: dataset.info(),
        matching: matching.into(),
        validation,
        terrain,
    })
}

/// Rule set plus the predicates that ship with the CLI
///
/// Diameter fields must hold a positive number. The predicates only run for fields that
/// have a rule in the loaded rule set.
fn builtin_schema(rules: RuleSet) -> ValidationSchema {
    let mut schema = ValidationSchema::new(rules);
    for field in ["DIMENSJON", "DIMENSION", "DIAMETER"] {
        schema = schema
            .with_point_predicate(field, positive_number)
            .with_line_predicate(field, positive_number);
    }
    schema
}

fn positive_number(value: &Scalar, _feature: FeatureRef<'_>) -> Option<String> {
    match value.as_f64() {
        Some(number) if number > 0.0 => None,
        _ => Some(format!("Expected a positive number, found '{value}'")),
    }
}

async fn correlate_terrain<S: ElevationService>(
    dataset: &Dataset,
    settings: &Settings,
    service: S,
) -> Result<TerrainSection, CliError> {
    let scheduler = TerrainScheduler::from_dataset(dataset, settings.scheduler_config(), service);
    scheduler.subscribe(|line, state| tracing::trace!(line, ?state, "Line state changed"));

    for index in 0..dataset.lines.len() {
        scheduler.enqueue(index)?;
    }
    // Promotion puts a line at the very head, so go backwards to keep the given order
    for id in settings.priority_lines.iter().rev() {
        match dataset.lines.iter().position(|line| &line.id == id) {
            Some(index) => {
                scheduler.promote(index)?;
            }
            None => warn!(%id, "Priority line not found in dataset"),
        }
    }

    let processed = scheduler.drain().await?;
    let stats = scheduler.stats();
    info!(
        processed,
        requests = stats.requests,
        cache_hit_ratio = stats.cache_hit_ratio,
        errors = stats.errors,
        "Terrain correlation done"
    );

    let lines = dataset
        .lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let terrain = scheduler.terrain(index);
            LineTerrainReport::new(
                index,
                line.id.as_str(),
                scheduler.state(index),
                terrain.as_deref(),
                settings.include_samples,
            )
        })
        .collect();

    Ok(TerrainSection { lines, stats })
}
