//! TOML-based study configuration and preset definitions.
//!
//! A study file declares the scenarios to load, the comparisons between
//! them and the KPIs to compute:
//!
//! ```toml
//! [study]
//! name = "prices"
//! export_folder = "out"
//! cache = "memory"
//!
//! [flags.units]
//! "Node.Price" = "EUR/MWh"
//!
//! [[scenario]]
//! name = "base"
//! source = "mock"
//! seed = 42
//!
//! [[scenario]]
//! name = "high"
//! source = "mock"
//! price_scale = 1.3
//!
//! [[comparison]]
//! variation = "high"
//! reference = "base"
//!
//! [[kpi]]
//! flags = ["Node.Price"]
//! aggregations = ["Mean", "Max"]
//! comparisons = ["Increase"]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::cache::{FetchCache, FileCache, MemoryCache};
use crate::dataset::{Attributes, CsvDirDataset, DatasetConfig, DatasetRef, DatasetSetup, FlagIndex};
use crate::error::{Result, StudyError};
use crate::kpi::{
    Aggregation, ComparisonKpiBuilder, DefinitionRef, FlagAggKpiBuilder, Unit, ValueComparison,
};
use crate::mock::MockPlatform;
use crate::study::StudyManager;

/// Top-level study configuration parsed from TOML.
///
/// Every section has defaults. Load from TOML with
/// [`StudyConfig::from_toml_file`] or start from a preset with
/// [`StudyConfig::from_preset`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudyConfig {
    /// Study name, export folder and cache backend.
    #[serde(default)]
    pub study: StudySection,
    /// Model links and units shared by every scenario.
    #[serde(default)]
    pub flags: FlagsSection,
    /// Scenario datasets, in declaration order.
    #[serde(default, rename = "scenario")]
    pub scenarios: Vec<ScenarioSection>,
    /// Declared `(variation, reference)` pairs.
    #[serde(default, rename = "comparison")]
    pub comparisons: Vec<ComparisonSection>,
    /// KPI groups computed by the CLI.
    #[serde(default, rename = "kpi")]
    pub kpis: Vec<KpiSection>,
}

/// Study-wide settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StudySection {
    /// Study name, used in log output and export file names.
    pub name: String,
    /// Folder receiving CSV exports (created if missing).
    pub export_folder: PathBuf,
    /// Cache backend: `"none"`, `"memory"` or `"file"`.
    pub cache: String,
    /// Folder of the `"file"` cache backend.
    pub cache_folder: PathBuf,
    /// Fetch behaviour applied to every scenario.
    pub fetch: DatasetConfig,
}

impl Default for StudySection {
    fn default() -> Self {
        Self {
            name: "study".to_string(),
            export_folder: PathBuf::from("output"),
            cache: "memory".to_string(),
            cache_folder: PathBuf::from(".scenario-cache"),
            fetch: DatasetConfig::default(),
        }
    }
}

/// Flag metadata merged into every scenario's flag index.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlagsSection {
    /// Variable flag → model flag.
    pub models: BTreeMap<String, String>,
    /// Flag → unit symbol (e.g. `"MWh"`, `"EUR/MWh"`).
    pub units: BTreeMap<String, String>,
    /// Suffix linking `<Class>.<anything>` to `<Class>.<suffix>`.
    pub class_model_suffix: Option<String>,
}

/// One scenario dataset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioSection {
    /// Unique scenario name.
    pub name: String,
    /// Data source: `"mock"` (synthetic) or `"csv"` (folder of `<flag>.csv`).
    pub source: String,
    /// Folder read by the `"csv"` source.
    pub path: Option<PathBuf>,
    /// Random seed of the `"mock"` source.
    pub seed: u64,
    /// Price multiplier of the `"mock"` source.
    pub price_scale: f64,
    /// Hourly periods of the `"mock"` source (must be > 0).
    pub periods: usize,
    /// Metadata attached to the dataset and propagated into KPIs.
    pub attributes: Attributes,
}

impl Default for ScenarioSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            source: "mock".to_string(),
            path: None,
            seed: 42,
            price_scale: 1.0,
            periods: 168,
            attributes: Attributes::new(),
        }
    }
}

/// A declared comparison between two scenarios.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComparisonSection {
    /// Scenario on the left of the difference.
    pub variation: String,
    /// Scenario subtracted from the variation.
    pub reference: String,
    /// Name override; defaults to `"<variation> vs <reference>"`.
    pub name: Option<String>,
}

/// A group of flag × aggregation KPIs, optionally compared across scenarios.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KpiSection {
    /// Flags to aggregate (must not be empty).
    pub flags: Vec<String>,
    /// Aggregation names (e.g. `"Sum"`, `"MTUsAboveZero"`, `"MTUsAbove50"`).
    pub aggregations: Vec<String>,
    /// Object (column) names; empty means every object.
    pub objects: Vec<String>,
    /// Value comparisons computed on every declared comparison.
    pub comparisons: Vec<String>,
    /// Prefix prepended to generated KPI names.
    pub name_prefix: String,
    /// Unit every KPI of the group is displayed in.
    pub target_unit: Option<String>,
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"scenario[1].name"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

const CACHE_BACKENDS: [&str; 3] = ["none", "memory", "file"];
const SOURCES: [&str; 2] = ["mock", "csv"];

impl StudyConfig {
    /// Available preset names.
    pub const PRESETS: &[&str] = &["demo", "single"];

    /// Three synthetic scenarios (base, high and low prices), two
    /// comparisons against base and a price/generation KPI set.
    pub fn demo() -> Self {
        let scenario = |name: &str, price_scale: f64, level: &str| ScenarioSection {
            name: name.to_string(),
            price_scale,
            attributes: Attributes::from([("price_level".to_string(), level.into())]),
            ..ScenarioSection::default()
        };
        Self {
            study: StudySection {
                name: "demo".to_string(),
                ..StudySection::default()
            },
            flags: FlagsSection::default(),
            scenarios: vec![
                scenario("base", 1.0, "reference"),
                scenario("high_prices", 1.3, "high"),
                scenario("low_prices", 0.8, "low"),
            ],
            comparisons: vec![
                ComparisonSection {
                    variation: "high_prices".to_string(),
                    reference: "base".to_string(),
                    name: None,
                },
                ComparisonSection {
                    variation: "low_prices".to_string(),
                    reference: "base".to_string(),
                    name: None,
                },
            ],
            kpis: vec![
                KpiSection {
                    flags: vec!["Node.Price".to_string()],
                    aggregations: vec!["Mean".into(), "Max".into(), "MTUsAbove60".into()],
                    comparisons: vec!["Increase".into(), "PercentageIncrease".into()],
                    ..KpiSection::default()
                },
                KpiSection {
                    flags: vec!["Generator.Generation".to_string(), "Generator.Revenue".to_string()],
                    aggregations: vec!["Sum".into()],
                    comparisons: vec!["Delta".into()],
                    ..KpiSection::default()
                },
            ],
        }
    }

    /// One synthetic scenario without comparisons.
    pub fn single() -> Self {
        Self {
            study: StudySection {
                name: "single".to_string(),
                ..StudySection::default()
            },
            scenarios: vec![ScenarioSection {
                name: "base".to_string(),
                ..ScenarioSection::default()
            }],
            kpis: vec![KpiSection {
                flags: vec!["Node.Price".to_string()],
                aggregations: vec!["Mean".into(), "Min".into(), "Max".into()],
                ..KpiSection::default()
            }],
            ..Self::default()
        }
    }

    /// Loads a study from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> std::result::Result<Self, ConfigError> {
        match name {
            "demo" => Ok(Self::demo()),
            "single" => Ok(Self::single()),
            _ => Err(ConfigError::new(
                "preset",
                format!("unknown preset \"{name}\", available: {}", Self::PRESETS.join(", ")),
            )),
        }
    }

    /// Parses a study from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> std::result::Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("study", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a study from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> std::result::Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Replaces the seed of every mock scenario.
    pub fn with_seed(mut self, seed: u64) -> Self {
        for scenario in &mut self.scenarios {
            scenario.seed = seed;
        }
        self
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.study.name.trim().is_empty() {
            errors.push(ConfigError::new("study.name", "must not be empty"));
        }
        if !CACHE_BACKENDS.contains(&self.study.cache.as_str()) {
            errors.push(ConfigError::new(
                "study.cache",
                format!("must be one of {}", CACHE_BACKENDS.join(", ")),
            ));
        }
        for (flag, unit) in &self.flags.units {
            if Unit::from_str(unit).is_err() {
                errors.push(ConfigError::new(
                    format!("flags.units.{flag}"),
                    format!("unknown unit \"{unit}\""),
                ));
            }
        }

        let mut names = BTreeSet::new();
        for (i, s) in self.scenarios.iter().enumerate() {
            let field = |f: &str| format!("scenario[{i}].{f}");
            if s.name.trim().is_empty() {
                errors.push(ConfigError::new(field("name"), "must not be empty"));
            } else if !names.insert(s.name.as_str()) {
                errors.push(ConfigError::new(
                    field("name"),
                    format!("duplicate scenario name \"{}\"", s.name),
                ));
            }
            match s.source.as_str() {
                "mock" => {
                    if s.periods == 0 {
                        errors.push(ConfigError::new(field("periods"), "must be > 0"));
                    }
                    if !s.price_scale.is_finite() || s.price_scale < 0.0 {
                        errors.push(ConfigError::new(field("price_scale"), "must be finite and >= 0"));
                    }
                }
                "csv" => {
                    if s.path.is_none() {
                        errors.push(ConfigError::new(field("path"), "required for csv source"));
                    }
                }
                other => errors.push(ConfigError::new(
                    field("source"),
                    format!("unknown source \"{other}\", expected one of {}", SOURCES.join(", ")),
                )),
            }
        }

        for (i, c) in self.comparisons.iter().enumerate() {
            for (key, value) in [("variation", &c.variation), ("reference", &c.reference)] {
                if !names.contains(value.as_str()) {
                    errors.push(ConfigError::new(
                        format!("comparison[{i}].{key}"),
                        format!("unknown scenario \"{value}\""),
                    ));
                }
            }
            if c.variation == c.reference {
                errors.push(ConfigError::new(
                    format!("comparison[{i}]"),
                    "variation and reference must differ",
                ));
            }
        }

        for (i, k) in self.kpis.iter().enumerate() {
            let field = |f: &str| format!("kpi[{i}].{f}");
            if k.flags.is_empty() {
                errors.push(ConfigError::new(field("flags"), "must not be empty"));
            }
            if k.aggregations.is_empty() {
                errors.push(ConfigError::new(field("aggregations"), "must not be empty"));
            }
            for agg in &k.aggregations {
                if let Err(e) = Aggregation::from_str(agg) {
                    errors.push(ConfigError::new(field("aggregations"), e.to_string()));
                }
            }
            for cmp in &k.comparisons {
                if let Err(e) = ValueComparison::from_str(cmp) {
                    errors.push(ConfigError::new(field("comparisons"), e.to_string()));
                }
            }
            if let Some(unit) = &k.target_unit {
                if Unit::from_str(unit).is_err() {
                    errors.push(ConfigError::new(field("target_unit"), format!("unknown unit \"{unit}\"")));
                }
            }
        }

        errors
    }

    /// Builds the configured cache backend.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::Cache`] for an unknown backend, or an I/O error
    /// if the file cache folder cannot be created.
    pub fn build_cache(&self) -> Result<Option<Arc<dyn FetchCache>>> {
        match self.study.cache.as_str() {
            "none" => Ok(None),
            "memory" => Ok(Some(Arc::new(MemoryCache::new()))),
            "file" => Ok(Some(Arc::new(FileCache::open(&self.study.cache_folder)?))),
            other => Err(StudyError::Cache(format!("unknown cache backend `{other}`"))),
        }
    }

    /// Extends `index` with the `[flags]` section.
    ///
    /// # Errors
    ///
    /// Returns an error if a unit symbol cannot be parsed.
    pub fn apply_flags(&self, mut index: FlagIndex) -> Result<FlagIndex> {
        for (flag, model) in &self.flags.models {
            index = index.with_model_flag(flag.as_str(), model.as_str());
        }
        for (flag, unit) in &self.flags.units {
            index = index.with_unit(flag.as_str(), Unit::from_str(unit)?);
        }
        if let Some(suffix) = &self.flags.class_model_suffix {
            index = index.with_class_model_suffix(suffix.clone());
        }
        Ok(index)
    }

    /// Builds one dataset per `[[scenario]]`, all sharing `cache`.
    ///
    /// # Errors
    ///
    /// Propagates dataset construction errors (unreadable csv folder,
    /// zero mock periods, unknown source).
    pub fn build_scenarios(&self, cache: Option<Arc<dyn FetchCache>>) -> Result<Vec<DatasetRef>> {
        let mut out: Vec<DatasetRef> = Vec::with_capacity(self.scenarios.len());
        for s in &self.scenarios {
            let dataset: DatasetRef = match s.source.as_str() {
                "mock" => {
                    let mut platform = MockPlatform::new(s.seed, s.price_scale, s.periods)
                        .with_attributes(s.attributes.clone())
                        .build(s.name.as_str())?
                        .with_flag_index(self.apply_flags(MockPlatform::flag_index())?)
                        .with_config(self.study.fetch);
                    if let Some(cache) = &cache {
                        platform = platform.with_cache(Arc::clone(cache));
                    }
                    Arc::new(platform)
                }
                "csv" => {
                    let path = s.path.as_deref().ok_or_else(|| {
                        StudyError::InvalidTable(format!("scenario `{}` has no csv path", s.name))
                    })?;
                    let mut dataset = CsvDirDataset::open(s.name.as_str(), path)?
                        .with_attributes(s.attributes.clone())
                        .with_flag_index(self.apply_flags(FlagIndex::default())?)
                        .with_config(self.study.fetch);
                    if let Some(cache) = &cache {
                        dataset = dataset.with_cache(Arc::clone(cache));
                    }
                    Arc::new(dataset)
                }
                other => {
                    return Err(StudyError::InvalidTable(format!(
                        "scenario `{}` has unknown source `{other}`",
                        s.name
                    )));
                }
            };
            debug!(scenario = %s.name, source = %s.source, "built scenario dataset");
            out.push(dataset);
        }
        Ok(out)
    }

    /// Builds the study: cache, scenarios and declared comparisons.
    ///
    /// # Errors
    ///
    /// Propagates cache, dataset and comparison errors.
    pub fn build_study(&self) -> Result<StudyManager> {
        let cache = self.build_cache()?;
        let scenarios = self.build_scenarios(cache)?;
        let mut study = StudyManager::from_scenarios(scenarios, &[] as &[(&str, &str)], &self.study.export_folder)?;
        for c in &self.comparisons {
            study.add_comparison_by_name(&c.variation, &c.reference, c.name.as_deref())?;
        }
        Ok(study)
    }

    /// KPI definitions for scenarios and for comparisons, in `[[kpi]]` order.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown aggregation, comparison or unit names.
    pub fn kpi_definitions(&self) -> Result<(Vec<DefinitionRef>, Vec<DefinitionRef>)> {
        let mut scenario_defs = Vec::new();
        let mut comparison_defs = Vec::new();
        for k in &self.kpis {
            let aggregations = k
                .aggregations
                .iter()
                .map(|a| Aggregation::from_str(a))
                .collect::<Result<Vec<_>>>()?;
            let comparisons = k
                .comparisons
                .iter()
                .map(|c| ValueComparison::from_str(c))
                .collect::<Result<Vec<_>>>()?;

            let mut builder = FlagAggKpiBuilder::new()
                .for_flags(k.flags.iter().map(String::as_str))
                .with_aggregations(aggregations)
                .with_name_prefix(k.name_prefix.clone());
            builder = if k.objects.is_empty() {
                builder.for_all_objects()
            } else {
                builder.for_objects(k.objects.iter().cloned())
            };
            let target_unit = k.target_unit.as_deref().map(Unit::from_str).transpose()?;
            if let Some(unit) = target_unit {
                for flag in &k.flags {
                    builder = builder.with_target_unit(flag.as_str(), unit);
                }
            }

            let base = builder.build();
            if !comparisons.is_empty() {
                let mut compared = ComparisonKpiBuilder::new(base.clone())
                    .with_comparisons(comparisons)
                    .with_name_prefix(k.name_prefix.clone());
                if let Some(unit) = target_unit {
                    compared = compared.with_target_unit(unit);
                }
                comparison_defs.extend(compared.build());
            }
            scenario_defs.extend(base);
        }
        Ok((scenario_defs, comparison_defs))
    }
}
