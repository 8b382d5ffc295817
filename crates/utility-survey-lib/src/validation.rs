//! Declarative attribute validation
//!
//! Rules are plain data and can be loaded from JSON as a [`RuleSet`]. Field checks that need
//! code are registered on the [`ValidationSchema`] as custom predicates keyed by field; a
//! predicate only runs for fields that also have a rule.

use crate::{Dataset, FeatureRef, Scalar};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// When a field must be present
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "String", into = "String"))]
pub enum Requirement {
    /// The field must carry a non-empty value
    Always,
    /// Any other requirement level; the field may be empty
    Other(String),
    #[default]
    Optional,
}

impl From<String> for Requirement {
    fn from(value: String) -> Self {
        match value.as_str() {
            "always" => Requirement::Always,
            "" | "optional" => Requirement::Optional,
            _ => Requirement::Other(value),
        }
    }
}

impl From<Requirement> for String {
    fn from(value: Requirement) -> Self {
        match value {
            Requirement::Always => "always".to_string(),
            Requirement::Optional => "optional".to_string(),
            Requirement::Other(other) => other,
        }
    }
}

/// How serious a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

/// One attribute rule
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ValidationRule {
    pub field_key: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub required: Requirement,
    /// Allowed values; empty means any value is accepted
    #[cfg_attr(feature = "serde", serde(default))]
    pub acceptable_values: Vec<Scalar>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub severity: Severity,
}

impl ValidationRule {
    pub fn new(field_key: impl Into<String>) -> Self {
        Self {
            field_key: field_key.into(),
            ..Default::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = Requirement::Always;
        self
    }

    pub fn accepting<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        self.acceptable_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

/// Ordered rule lists for both feature kinds
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct RuleSet {
    pub point_rules: Vec<ValidationRule>,
    pub line_rules: Vec<ValidationRule>,
}

impl RuleSet {
    /// Read a rule set from its JSON representation
    #[cfg(feature = "serde")]
    pub fn from_json_reader<R: std::io::Read>(reader: R) -> crate::Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Read a rule set from a JSON file
    #[cfg(feature = "serde")]
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> crate::Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_json_reader(std::io::BufReader::new(file))
    }
}

/// Field check implemented in code
///
/// Receives the field value and the whole feature; returns a message when the value is
/// not acceptable.
pub type CustomPredicate = Box<dyn Fn(&Scalar, FeatureRef<'_>) -> Option<String> + Send + Sync>;

/// Rules plus custom predicates for points and lines
#[derive(Default)]
pub struct ValidationSchema {
    pub rules: RuleSet,
    point_predicates: HashMap<String, CustomPredicate>,
    line_predicates: HashMap<String, CustomPredicate>,
}

impl fmt::Debug for ValidationSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationSchema")
            .field("rules", &self.rules)
            .field("point_predicates", &self.point_predicates.keys())
            .field("line_predicates", &self.line_predicates.keys())
            .finish()
    }
}

impl ValidationSchema {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            ..Default::default()
        }
    }

    /// Register a predicate for a point field, replacing any previous one
    pub fn with_point_predicate<F>(mut self, field: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Scalar, FeatureRef<'_>) -> Option<String> + Send + Sync + 'static,
    {
        self.point_predicates
            .insert(field.into(), Box::new(predicate));
        self
    }

    /// Register a predicate for a line field, replacing any previous one
    pub fn with_line_predicate<F>(mut self, field: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Scalar, FeatureRef<'_>) -> Option<String> + Send + Sync + 'static,
    {
        self.line_predicates.insert(field.into(), Box::new(predicate));
        self
    }

    pub fn point_predicates(&self) -> &HashMap<String, CustomPredicate> {
        &self.point_predicates
    }

    pub fn line_predicates(&self) -> &HashMap<String, CustomPredicate> {
        &self.line_predicates
    }
}

/// A single finding
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ValidationError {
    pub feature_id: String,
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

/// Findings for a whole dataset
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ValidationReport {
    /// Point findings first, then line findings, in dataset order
    pub errors: Vec<ValidationError>,
    pub total_points: usize,
    pub total_lines: usize,
    pub total_errors: usize,
    pub is_valid: bool,
}

/// Validate one feature against an ordered rule list
pub fn validate_feature(
    feature: FeatureRef<'_>,
    rules: &[ValidationRule],
    predicates: &HashMap<String, CustomPredicate>,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let error = |rule: &ValidationRule, message: String| ValidationError {
        feature_id: feature.id().to_string(),
        field: rule.field_key.clone(),
        message,
        severity: rule.severity,
    };

    for rule in rules {
        let value = feature
            .attribute(&rule.field_key)
            .filter(|value| !value.is_empty());

        let Some(value) = value else {
            if rule.required == Requirement::Always {
                errors.push(error(
                    rule,
                    format!("Required field '{}' is missing or empty", rule.field_key),
                ));
            }
            continue;
        };

        if !rule.acceptable_values.is_empty() {
            let normalized = value.normalized();
            let accepted = rule
                .acceptable_values
                .iter()
                .any(|allowed| allowed.normalized() == normalized);
            if !accepted {
                let allowed: Vec<String> =
                    rule.acceptable_values.iter().map(Scalar::normalized).collect();
                errors.push(error(
                    rule,
                    format!(
                        "Value '{}' is not allowed for '{}' (allowed: {})",
                        normalized,
                        rule.field_key,
                        allowed.join(", ")
                    ),
                ));
            }
        }

        if let Some(message) = predicates
            .get(&rule.field_key)
            .and_then(|predicate| predicate(value, feature))
        {
            errors.push(error(rule, message));
        }
    }

    errors
}

/// Validate every point and line of a dataset
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn validate_dataset(dataset: &Dataset, schema: &ValidationSchema) -> ValidationReport {
    let point_errors = dataset.points.iter().flat_map(|point| {
        validate_feature(
            FeatureRef::Point(point),
            &schema.rules.point_rules,
            schema.point_predicates(),
        )
    });
    let line_errors = dataset.lines.iter().flat_map(|line| {
        validate_feature(
            FeatureRef::Line(line),
            &schema.rules.line_rules,
            schema.line_predicates(),
        )
    });
    let errors: Vec<ValidationError> = point_errors.chain(line_errors).collect();

    let report = ValidationReport {
        total_points: dataset.points.len(),
        total_lines: dataset.lines.len(),
        total_errors: errors.len(),
        is_valid: errors.is_empty(),
        errors,
    };
    tracing::debug!(
        points = report.total_points,
        lines = report.total_lines,
        errors = report.total_errors,
        "Validation finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coordinate, LineFeature, PointFeature};

    fn no_predicates() -> HashMap<String, CustomPredicate> {
        HashMap::new()
    }

    fn pipe() -> LineFeature {
        LineFeature::new(
            "P1",
            "LED",
            vec![Coordinate::new(0.0, 0.0), Coordinate::new(10.0, 0.0)],
        )
    }

    #[test]
    fn test_required_empty_yields_single_error() {
        let rules = vec![ValidationRule::new("MATERIAL")
            .required()
            .accepting(["PVC", "BET"])];
        let mut predicates = no_predicates();
        predicates.insert(
            "MATERIAL".into(),
            Box::new(|_: &Scalar, _: FeatureRef<'_>| Some("never".to_string())),
        );

        for empty in ["", "  "] {
            let line = pipe().with_attribute("MATERIAL", empty);
            let errors = validate_feature(FeatureRef::Line(&line), &rules, &predicates);
            assert_eq!(errors.len(), 1, "value {empty:?}");
            assert_eq!(errors[0].feature_id, "P1");
            assert_eq!(errors[0].field, "MATERIAL");
            assert!(errors[0].message.contains("missing"));
        }
    }

    #[test]
    fn test_missing_key_counts_as_empty() {
        let line = pipe();
        let rules = vec![
            ValidationRule::new("MATERIAL").required(),
            ValidationRule::new("OWNER").accepting(["KOMMUNE"]),
        ];
        let errors = validate_feature(FeatureRef::Line(&line), &rules, &no_predicates());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "MATERIAL");
    }

    #[test]
    fn test_acceptable_values_normalized() {
        let rules = vec![ValidationRule::new("DIMENSION").accepting([200.0, 315.0])];

        let numeric_text = pipe().with_attribute("DIMENSION", " 200 ");
        assert!(validate_feature(FeatureRef::Line(&numeric_text), &rules, &no_predicates())
            .is_empty());

        let number = pipe().with_attribute("DIMENSION", 315.0);
        assert!(validate_feature(FeatureRef::Line(&number), &rules, &no_predicates()).is_empty());

        let wrong = pipe().with_attribute("DIMENSION", 250.0);
        let errors = validate_feature(FeatureRef::Line(&wrong), &rules, &no_predicates());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("250"));
        assert!(errors[0].message.contains("200, 315"));
    }

    #[test]
    fn test_comparison_is_case_sensitive() {
        let rules = vec![ValidationRule::new("MATERIAL").accepting(["PVC"])];
        let line = pipe().with_attribute("MATERIAL", "pvc");
        assert_eq!(
            validate_feature(FeatureRef::Line(&line), &rules, &no_predicates()).len(),
            1
        );
    }

    #[test]
    fn test_value_and_predicate_checks_are_independent() {
        let line = pipe().with_attribute("MATERIAL", "STEEL");
        let rules = vec![ValidationRule::new("MATERIAL")
            .accepting(["PVC"])
            .with_severity(Severity::Warning)];
        let mut predicates = no_predicates();
        predicates.insert(
            "MATERIAL".into(),
            Box::new(|value: &Scalar, feature: FeatureRef<'_>| {
                Some(format!("{} on {} is deprecated", value, feature.id()))
            }),
        );

        let errors = validate_feature(FeatureRef::Line(&line), &rules, &predicates);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].message, "STEEL on P1 is deprecated");
        assert!(errors.iter().all(|e| e.severity == Severity::Warning));
    }

    #[test]
    fn test_predicate_without_rule_not_invoked() {
        let schema = ValidationSchema::default().with_line_predicate("MATERIAL", |_, _| {
            panic!("predicate without a rule must not run")
        });
        let dataset = Dataset::new(
            25832,
            Vec::new(),
            vec![pipe().with_attribute("MATERIAL", "PVC")],
        );
        assert!(validate_dataset(&dataset, &schema).is_valid);
    }

    #[test]
    fn test_predicate_sees_whole_feature() {
        let schema = ValidationSchema::new(RuleSet {
            point_rules: vec![ValidationRule::new("DEPTH")],
            line_rules: Vec::new(),
        })
        .with_point_predicate("DEPTH", |value, feature| {
            let kind = feature.attribute("TYPE")?;
            (kind.normalized() == "SLU" && value.as_f64()? < 1.0)
                .then(|| "Drain chambers must be at least 1 m deep".to_string())
        });

        let dataset = Dataset::new(
            25832,
            vec![
                PointFeature::new("K1", "KUM", Coordinate::new(0.0, 0.0))
                    .with_attribute("TYPE", "SLU")
                    .with_attribute("DEPTH", 0.8),
                PointFeature::new("K2", "KUM", Coordinate::new(1.0, 0.0))
                    .with_attribute("TYPE", "SAN")
                    .with_attribute("DEPTH", 0.8),
            ],
            Vec::new(),
        );

        let report = validate_dataset(&dataset, &schema);
        assert_eq!(report.total_errors, 1);
        assert_eq!(report.errors[0].feature_id, "K1");
    }

    #[test]
    fn test_dataset_report_order_and_counts() {
        let schema = ValidationSchema::new(RuleSet {
            point_rules: vec![ValidationRule::new("DIMENSION").required()],
            line_rules: vec![ValidationRule::new("MATERIAL").required()],
        });
        let dataset = Dataset::new(
            25832,
            vec![
                PointFeature::new("K1", "KUM", Coordinate::new(0.0, 0.0)),
                PointFeature::new("K2", "KUM", Coordinate::new(1.0, 0.0))
                    .with_attribute("DIMENSION", 1000.0),
            ],
            vec![pipe()],
        );

        let report = validate_dataset(&dataset, &schema);
        assert_eq!(report.total_points, 2);
        assert_eq!(report.total_lines, 1);
        assert_eq!(report.total_errors, 2);
        assert!(!report.is_valid);
        let ids: Vec<_> = report.errors.iter().map(|e| e.feature_id.as_str()).collect();
        assert_eq!(ids, vec!["K1", "P1"]);
    }

    #[test]
    fn test_requirement_from_string() {
        assert_eq!(Requirement::from("always".to_string()), Requirement::Always);
        assert_eq!(Requirement::from("".to_string()), Requirement::Optional);
        assert_eq!(
            Requirement::from("conditional".to_string()),
            Requirement::Other("conditional".into())
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_rule_set_from_json() {
        let json = r#"{
            "pointRules": [
                { "fieldKey": "DIMENSION", "required": "always", "acceptableValues": [600, "1000"] }
            ],
            "lineRules": [
                { "fieldKey": "MATERIAL", "required": "when-known", "severity": "warning" }
            ]
        }"#;

        let rules = RuleSet::from_json_reader(json.as_bytes()).unwrap();
        assert_eq!(rules.point_rules[0].required, Requirement::Always);
        assert_eq!(
            rules.point_rules[0].acceptable_values,
            vec![Scalar::Number(600.0), Scalar::from("1000")]
        );
        assert_eq!(rules.point_rules[0].severity, Severity::Error);
        assert_eq!(
            rules.line_rules[0].required,
            Requirement::Other("when-known".into())
        );
        assert_eq!(rules.line_rules[0].severity, Severity::Warning);
        assert!(rules.line_rules[0].acceptable_values.is_empty());
    }
}
