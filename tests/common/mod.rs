//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use scenario_study::cache::FetchCache;
use scenario_study::dataset::{
    Attributes, Dataset, DatasetConfig, DatasetRef, DatasetSetup, FetchContext, Flag, FlagIndex,
    TableDataset,
};
use scenario_study::mock::MockPlatform;
use scenario_study::study::StudyManager;
use scenario_study::table::Table;
use scenario_study::Result;

static NO_FLAGS: FlagIndex = FlagIndex::empty();

/// Four hourly timestamps starting 2024-01-01 00:00.
pub fn hourly_index() -> Vec<String> {
    (0..4).map(|h| format!("2024-01-01 {h:02}:00:00")).collect()
}

/// Single-flag scenario whose `Node.Price` is `base + h` for node `DE`
/// and `2 * (base + h)` for node `FR`.
pub fn price_scenario(name: &str, base: f64) -> TableDataset {
    let de: Vec<f64> = (0..4).map(|h| base + h as f64).collect();
    let fr: Vec<f64> = de.iter().map(|v| v * 2.0).collect();
    let table = Table::from_numeric("snapshot", hourly_index(), vec![("DE", de), ("FR", fr)])
        .expect("price table");
    TableDataset::new(name).with_table("Node.Price", table)
}

pub fn price_scenario_ref(name: &str, base: f64, year: i64) -> DatasetRef {
    Arc::new(price_scenario(name, base).with_attribute("year", year))
}

/// Study over three mock scenarios with two comparisons against `base`.
pub fn mock_study(export_folder: &Path) -> StudyManager {
    let scenario = |name: &str, scale: f64| -> DatasetRef {
        Arc::new(
            MockPlatform::new(7, scale, 48)
                .with_attributes(Attributes::from([("scale".to_string(), scale.into())]))
                .build(name)
                .expect("mock platform"),
        )
    };
    StudyManager::from_scenarios(
        vec![scenario("base", 1.0), scenario("high", 1.5), scenario("low", 0.5)],
        &[("high", "base"), ("low", "base")],
        export_folder,
    )
    .expect("study")
}

/// Dataset serving one table and counting calls to `fetch_raw`.
#[derive(Debug)]
pub struct CountingDataset {
    name: String,
    flag: Flag,
    table: Table,
    config: DatasetConfig,
    cache: Option<Arc<dyn FetchCache>>,
    raw_fetches: AtomicUsize,
}

impl CountingDataset {
    pub fn new(name: &str, flag: &str, table: Table) -> Self {
        Self {
            name: name.to_string(),
            flag: Flag::from(flag),
            table,
            config: DatasetConfig::default(),
            cache: None,
            raw_fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn FetchCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn raw_fetches(&self) -> usize {
        self.raw_fetches.load(Ordering::SeqCst)
    }
}

impl Dataset for CountingDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "counting"
    }

    fn accepted_flags(&self) -> BTreeSet<Flag> {
        BTreeSet::from([self.flag.clone()])
    }

    fn attributes(&self) -> Attributes {
        Attributes::new()
    }

    fn flag_index(&self) -> &FlagIndex {
        &NO_FLAGS
    }

    fn config(&self) -> &DatasetConfig {
        &self.config
    }

    fn cache(&self) -> Option<&dyn FetchCache> {
        self.cache.as_deref()
    }

    fn fetch_raw(&self, _flag: &Flag, _ctx: &FetchContext<'_>) -> Result<Table> {
        self.raw_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.table.clone())
    }
}
