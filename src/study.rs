//! Study manager: named scenarios, declared comparisons and the stacked
//! views over them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::dataset::{ConcatCollection, DATASET_LEVEL, Dataset, DatasetComparison, DatasetRef};
use crate::error::{Result, StudyError};
use crate::kpi::{self, DefinitionRef, KpiCollection};

/// Name of the stacked scenario view.
pub const SCENARIO_VIEW: &str = "scenario";
/// Name of the stacked comparison view.
pub const COMPARISON_VIEW: &str = "comparison";
/// Column level separating scenarios from comparisons in [`StudyManager::scen_comp`].
pub const TYPE_LEVEL: &str = "type";

/// Holds one dataset per scenario plus the comparisons between them.
///
/// - [`StudyManager::scen`] stacks every scenario under a `dataset` column level.
/// - [`StudyManager::comp`] stacks every comparison (variation − reference).
/// - [`StudyManager::scen_comp`] stacks both views under a `type` level.
///
/// The views are rebuilt whenever a scenario or comparison is added.
#[derive(Debug, Clone)]
pub struct StudyManager {
    scenarios: Vec<DatasetRef>,
    comparisons: Vec<DatasetRef>,
    scen: Arc<ConcatCollection>,
    comp: Arc<ConcatCollection>,
    scen_comp: Arc<ConcatCollection>,
    export_folder: PathBuf,
}

impl StudyManager {
    /// Empty study exporting into `export_folder` (created if needed).
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the folder cannot be created.
    pub fn new(export_folder: impl AsRef<Path>) -> Result<Self> {
        let export_folder = export_folder.as_ref().to_path_buf();
        fs::create_dir_all(&export_folder)?;
        let empty = || Arc::new(ConcatCollection::new("", Vec::new()));
        let mut study = Self {
            scenarios: Vec::new(),
            comparisons: Vec::new(),
            scen: empty(),
            comp: empty(),
            scen_comp: empty(),
            export_folder,
        };
        study.rebuild();
        Ok(study)
    }

    /// Builds a study from scenario datasets and `(variation, reference)`
    /// name pairs. Comparisons get the default `"<variation> vs <reference>"` name.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::UnknownDataset`] if a pair names a scenario
    /// that is not in `scenarios`, or an I/O error for the export folder.
    pub fn from_scenarios<S: AsRef<str>>(
        scenarios: Vec<DatasetRef>,
        comparisons: &[(S, S)],
        export_folder: impl AsRef<Path>,
    ) -> Result<Self> {
        let mut study = Self::new(export_folder)?;
        for scenario in scenarios {
            study.push_scenario(scenario);
        }
        for (variation, reference) in comparisons {
            study.push_comparison_by_name(variation.as_ref(), reference.as_ref(), None)?;
        }
        study.rebuild();
        info!(
            scenarios = study.scenarios.len(),
            comparisons = study.comparisons.len(),
            export_folder = %study.export_folder.display(),
            "study initialised"
        );
        Ok(study)
    }

    /// Adds (or replaces, by name) a scenario.
    pub fn add_scenario(&mut self, scenario: DatasetRef) {
        self.push_scenario(scenario);
        self.rebuild();
    }

    /// Adds (or replaces, by name) a comparison.
    pub fn add_comparison(&mut self, comparison: DatasetComparison) {
        replace_or_push(&mut self.comparisons, Arc::new(comparison));
        self.rebuild();
    }

    /// Adds a comparison between two registered scenarios.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::UnknownDataset`] if either name is not a scenario.
    pub fn add_comparison_by_name(
        &mut self,
        variation: &str,
        reference: &str,
        name: Option<&str>,
    ) -> Result<()> {
        self.push_comparison_by_name(variation, reference, name)?;
        self.rebuild();
        Ok(())
    }

    pub fn scen(&self) -> &Arc<ConcatCollection> {
        &self.scen
    }

    pub fn comp(&self) -> &Arc<ConcatCollection> {
        &self.comp
    }

    pub fn scen_comp(&self) -> &Arc<ConcatCollection> {
        &self.scen_comp
    }

    pub fn scenarios(&self) -> &[DatasetRef] {
        &self.scenarios
    }

    pub fn comparisons(&self) -> &[DatasetRef] {
        &self.comparisons
    }

    pub fn scenario(&self, name: &str) -> Option<&DatasetRef> {
        self.scenarios.iter().find(|d| d.name() == name)
    }

    pub fn comparison(&self, name: &str) -> Option<&DatasetRef> {
        self.comparisons.iter().find(|d| d.name() == name)
    }

    /// Resolves a view name (`scen`, `comp`, `scen-comp`) or a scenario or
    /// comparison name to a dataset.
    pub fn view(&self, name: &str) -> Option<DatasetRef> {
        match name {
            "scen" | SCENARIO_VIEW => Some(self.scen.clone() as DatasetRef),
            "comp" | COMPARISON_VIEW => Some(self.comp.clone() as DatasetRef),
            "scen-comp" | "scen_comp" => Some(self.scen_comp.clone() as DatasetRef),
            other => self
                .scenario(other)
                .or_else(|| self.comparison(other))
                .cloned(),
        }
    }

    pub fn export_folder(&self) -> &Path {
        &self.export_folder
    }

    /// Path of `file_name` inside the export folder.
    pub fn export_path(&self, file_name: impl AsRef<Path>) -> PathBuf {
        self.export_folder.join(file_name)
    }

    /// Runs `scenario_definitions` on every scenario and
    /// `comparison_definitions` on every comparison. KPIs are tagged with
    /// `dataset_type` `"scenario"` or `"comparison"`.
    ///
    /// # Errors
    ///
    /// Propagates the first definition error.
    pub fn compute_kpis(
        &self,
        scenario_definitions: &[DefinitionRef],
        comparison_definitions: &[DefinitionRef],
    ) -> Result<KpiCollection> {
        let mut collection = KpiCollection::new();
        for (datasets, definitions, dataset_type) in [
            (&self.scenarios, scenario_definitions, SCENARIO_VIEW),
            (&self.comparisons, comparison_definitions, COMPARISON_VIEW),
        ] {
            for dataset in datasets {
                let mut kpis = kpi::generate_for(dataset.as_ref(), definitions)?;
                for kpi in &mut kpis {
                    kpi.attributes.dataset_type = dataset_type.to_string();
                }
                collection.extend(kpis);
            }
        }
        info!(kpis = collection.len(), "computed KPIs");
        Ok(collection)
    }

    fn push_scenario(&mut self, scenario: DatasetRef) {
        replace_or_push(&mut self.scenarios, scenario);
    }

    fn push_comparison_by_name(
        &mut self,
        variation: &str,
        reference: &str,
        name: Option<&str>,
    ) -> Result<()> {
        let lookup = |n: &str| {
            self.scenario(n)
                .cloned()
                .ok_or_else(|| StudyError::UnknownDataset(n.to_string()))
        };
        let mut comparison = DatasetComparison::new(lookup(variation)?, lookup(reference)?);
        if let Some(name) = name {
            comparison = comparison.with_name(name);
        }
        replace_or_push(&mut self.comparisons, Arc::new(comparison));
        Ok(())
    }

    fn rebuild(&mut self) {
        self.scen = Arc::new(
            ConcatCollection::new(SCENARIO_VIEW, self.scenarios.clone()).with_level_name(DATASET_LEVEL),
        );
        self.comp = Arc::new(
            ConcatCollection::new(COMPARISON_VIEW, self.comparisons.clone())
                .with_level_name(DATASET_LEVEL),
        );
        let views = vec![self.scen.clone() as DatasetRef, self.comp.clone() as DatasetRef];
        self.scen_comp = Arc::new(
            ConcatCollection::new("scenario_comparison", views).with_level_name(TYPE_LEVEL),
        );
    }
}

fn replace_or_push(datasets: &mut Vec<DatasetRef>, dataset: DatasetRef) {
    match datasets.iter_mut().find(|d| d.name() == dataset.name()) {
        Some(slot) => {
            warn!(dataset = dataset.name(), "replacing dataset with the same name");
            *slot = dataset;
        }
        None => datasets.push(dataset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TableDataset;
    use crate::table::Table;

    fn scenario(name: &str, price: f64) -> DatasetRef {
        let table = Table::from_numeric(
            "time",
            vec!["0".into(), "1".into()],
            vec![("DE", vec![price, price + 1.0])],
        )
        .expect("table");
        Arc::new(TableDataset::new(name).with_table("Node.Price", table))
    }

    #[test]
    fn unknown_comparison_member_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = StudyManager::from_scenarios(
            vec![scenario("base", 10.0)],
            &[("high", "base")],
            dir.path(),
        )
        .expect_err("unknown");
        assert!(matches!(err, StudyError::UnknownDataset(name) if name == "high"));
    }

    #[test]
    fn export_folder_is_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let folder = dir.path().join("out/nested");
        let study = StudyManager::from_scenarios(Vec::new(), &[] as &[(&str, &str)], &folder)
            .expect("study");
        assert!(folder.is_dir());
        assert_eq!(study.export_path("kpis.csv"), folder.join("kpis.csv"));
    }

    #[test]
    fn views_track_additions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut study =
            StudyManager::from_scenarios(vec![scenario("base", 10.0)], &[] as &[(&str, &str)], dir.path())
                .expect("study");
        study.add_scenario(scenario("high", 15.0));
        study
            .add_comparison_by_name("high", "base", Some("high-base"))
            .expect("comparison");

        assert_eq!(study.scen().names(), ["base", "high"]);
        assert_eq!(study.comp().names(), ["high-base"]);
        assert_eq!(study.view("scen-comp").map(|d| d.name().to_string()).as_deref(), Some("scenario_comparison"));
        assert!(study.view("high-base").is_some());
        assert!(study.view("missing").is_none());

        let delta = study.comp().fetch(&"Node.Price".into()).expect("delta");
        assert_eq!(delta.top_level_labels(), ["high-base"]);
    }
}
