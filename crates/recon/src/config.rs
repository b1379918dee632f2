use std::collections::HashMap;

use regex::RegexBuilder;
use serde::{Deserialize, Deserializer, Serialize};

use crate::engine::EngineOptions;
use crate::error::ReconError;
use crate::mapping::DEFAULT_MAPPING_THRESHOLD;
use crate::model::{ReconInput, SourceTable};
use crate::normalize::{eq_ignore_case, fold, ComparisonMode};

// ---------------------------------------------------------------------------
// Run profile
// ---------------------------------------------------------------------------

/// One reconciliation run: what is being compared and where the tables live.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RunProfile {
    pub asset_class: String,
    pub data_point: String,
    #[serde(default)]
    pub comparison: ComparisonMode,
    #[serde(default = "default_threshold")]
    pub mapping_threshold: f64,
    pub sources: Vec<SourceProfile>,
    #[serde(default, skip_serializing_if = "OutputConfig::is_default")]
    pub output: OutputConfig,
}

fn default_threshold() -> f64 {
    DEFAULT_MAPPING_THRESHOLD
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SourceProfile {
    pub name: String,
    pub file: String,
    /// Overrides the profile's `data_point` for this source only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_column: Option<String>,
    /// File-name wildcards (`*`, `?`); empty accepts any file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl SourceProfile {
    pub fn matches_file(&self, file_name: &str) -> bool {
        matches_any_pattern(file_name, &self.patterns)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory for the workbook, audit log and package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(default)]
    pub zip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<String>,
}

impl OutputConfig {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl RunProfile {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let profile: RunProfile =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.asset_class.trim().is_empty() {
            return Err(ReconError::ConfigValidation("asset_class must not be empty".into()));
        }
        if self.data_point.trim().is_empty() {
            return Err(ReconError::ConfigValidation("data_point must not be empty".into()));
        }
        if self.sources.is_empty() {
            return Err(ReconError::ConfigValidation("at least 1 source is required".into()));
        }
        if !(self.mapping_threshold > 0.0 && self.mapping_threshold <= 1.0) {
            return Err(ReconError::ConfigValidation(format!(
                "mapping_threshold must be in (0, 1], got {}",
                self.mapping_threshold
            )));
        }

        let mut seen: Vec<String> = Vec::new();
        for src in &self.sources {
            if src.name.trim().is_empty() {
                return Err(ReconError::ConfigValidation("source name must not be empty".into()));
            }
            if src.file.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "source '{}': file must not be empty",
                    src.name
                )));
            }
            let folded = fold(src.name.trim());
            if seen.contains(&folded) {
                return Err(ReconError::DuplicateSource(src.name.clone()));
            }
            seen.push(folded);

            let file_name = std::path::Path::new(&src.file)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(&src.file);
            if !src.matches_file(file_name) {
                return Err(ReconError::ConfigValidation(format!(
                    "source '{}': file '{}' does not match any of {:?}",
                    src.name, file_name, src.patterns
                )));
            }
        }

        Ok(())
    }

    /// Source name → key column, only for sources with an explicit override.
    pub fn key_overrides(&self) -> HashMap<String, String> {
        self.sources
            .iter()
            .filter_map(|s| s.key_column.as_ref().map(|k| (s.name.clone(), k.clone())))
            .collect()
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            comparison: self.comparison,
            mapping_threshold: self.mapping_threshold,
            ..EngineOptions::default()
        }
    }

    /// A profile with one source per requirement, for the operator to fill in.
    ///
    /// Each source's `file` is a placeholder that satisfies its own patterns.
    pub fn skeleton(asset_class: &str, data_point: &str, requirements: &[InputRequirement]) -> Self {
        Self {
            asset_class: asset_class.to_string(),
            data_point: data_point.to_string(),
            comparison: ComparisonMode::default(),
            mapping_threshold: DEFAULT_MAPPING_THRESHOLD,
            sources: requirements
                .iter()
                .map(|req| SourceProfile {
                    name: req.label.clone(),
                    file: req.placeholder_file(),
                    key_column: None,
                    patterns: req.patterns.clone(),
                    description: req.description.clone(),
                })
                .collect(),
            output: OutputConfig::default(),
        }
    }

    pub fn to_toml(&self) -> Result<String, ReconError> {
        toml::to_string_pretty(self).map_err(|e| ReconError::ConfigParse(e.to_string()))
    }

    /// Assemble engine input from tables already loaded for this profile.
    pub fn input(&self, sources: Vec<SourceTable>) -> ReconInput {
        ReconInput {
            asset_class: self.asset_class.clone(),
            data_point: self.data_point.clone(),
            sources,
            key_overrides: self.key_overrides(),
        }
    }
}

// ---------------------------------------------------------------------------
// Asset-class catalog
// ---------------------------------------------------------------------------

/// A source slot an asset class expects the operator to fill.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InputRequirement {
    #[serde(default = "default_label", deserialize_with = "null_as_default_label")]
    pub label: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub patterns: Vec<String>,
}

impl InputRequirement {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: String::new(),
            patterns: Vec::new(),
        }
    }

    pub fn matches_file(&self, file_name: &str) -> bool {
        matches_any_pattern(file_name, &self.patterns)
    }

    /// First usable pattern with `*` dropped and `?` as `0`, else `<label>.csv`.
    pub fn placeholder_file(&self) -> String {
        self.patterns
            .iter()
            .map(|p| p.trim().replace('*', "").replace('?', "0"))
            .find(|f| !f.is_empty())
            .unwrap_or_else(|| {
                let slug: String = self
                    .label
                    .trim()
                    .chars()
                    .map(|c| if c.is_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '_' })
                    .collect();
                format!("{slug}.csv")
            })
    }
}

fn default_label() -> String {
    "Source".into()
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

fn null_as_default_label<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_else(default_label))
}

/// Asset class → expected sources, loaded from JSON.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    classes: Vec<(String, Vec<InputRequirement>)>,
}

impl Catalog {
    /// Accepts `{class: [{label, description?, patterns?}]}` or the older
    /// `{class: ["label", ...]}` shape.
    pub fn from_json(input: &str) -> Result<Self, ReconError> {
        let mut classes: Vec<(String, Vec<InputRequirement>)> =
            match serde_json::from_str::<HashMap<String, Vec<InputRequirement>>>(input) {
                Ok(full) => full.into_iter().collect(),
                Err(full_err) => {
                    let legacy: HashMap<String, Vec<String>> = serde_json::from_str(input)
                        .map_err(|_| ReconError::ConfigParse(full_err.to_string()))?;
                    legacy
                        .into_iter()
                        .map(|(class, labels)| {
                            (class, labels.into_iter().map(InputRequirement::labelled).collect())
                        })
                        .collect()
                }
            };
        classes.sort_by(|a, b| fold(&a.0).cmp(&fold(&b.0)));
        Ok(Self { classes })
    }

    pub fn asset_classes(&self) -> Vec<&str> {
        self.classes.iter().map(|(c, _)| c.as_str()).collect()
    }

    /// Requirements for `asset_class`; Baseline + Discovery when unknown or empty.
    pub fn requirements(&self, asset_class: &str) -> Vec<InputRequirement> {
        self.classes
            .iter()
            .find(|(c, _)| eq_ignore_case(c, asset_class))
            .map(|(_, reqs)| reqs.clone())
            .filter(|reqs| !reqs.is_empty())
            .unwrap_or_else(|| {
                vec![
                    InputRequirement::labelled("Baseline"),
                    InputRequirement::labelled("Discovery"),
                ]
            })
    }
}

// ---------------------------------------------------------------------------
// Wildcards
// ---------------------------------------------------------------------------

/// Case-insensitive `*`/`?` match against any pattern; no patterns accepts all.
pub fn matches_any_pattern(file_name: &str, patterns: &[String]) -> bool {
    patterns.is_empty() || patterns.iter().any(|p| wildcard_match(file_name, p))
}

fn wildcard_match(text: &str, wildcard: &str) -> bool {
    if wildcard.is_empty() {
        return false;
    }
    let pattern = format!(
        "^{}$",
        regex::escape(wildcard).replace(r"\*", ".*").replace(r"\?", ".")
    );
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
