//! Study-level behaviour: stacked views, comparisons and caching.

mod common;

use std::sync::Arc;

use scenario_study::cache::{FetchCache, FileCache, MemoryCache};
use scenario_study::dataset::{
    ConfigOverrides, Dataset, DatasetComparison, DatasetRef, Flag, TableDataset,
};
use scenario_study::study::StudyManager;
use scenario_study::table::{ColumnKey, Table};
use scenario_study::StudyError;

use common::{CountingDataset, hourly_index, price_scenario, price_scenario_ref};

fn price() -> Flag {
    Flag::from("Node.Price")
}

#[test]
fn scenario_view_has_one_top_level_label_per_scenario_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let study = StudyManager::from_scenarios(
        vec![
            price_scenario_ref("base", 10.0, 2030),
            price_scenario_ref("high", 20.0, 2030),
            price_scenario_ref("low", 5.0, 2040),
        ],
        &[] as &[(&str, &str)],
        dir.path(),
    )
    .expect("study");

    let table = study.scen().fetch(&price()).expect("fetch");
    assert_eq!(table.top_level_labels(), ["base", "high", "low"]);
    assert_eq!(table.ncols(), 6);
    assert_eq!(table.level_names()[0], "dataset");

    let high = table.select_top_level("high").expect("high");
    assert_eq!(high.numeric_column(&"DE".into()).expect("DE"), vec![20.0, 21.0, 22.0, 23.0]);
}

#[test]
fn comparison_view_is_variation_minus_reference() {
    let dir = tempfile::tempdir().expect("tempdir");
    let study = StudyManager::from_scenarios(
        vec![price_scenario_ref("base", 10.0, 2030), price_scenario_ref("high", 13.0, 2030)],
        &[("high", "base")],
        dir.path(),
    )
    .expect("study");

    let delta = study.comp().fetch(&price()).expect("delta");
    assert_eq!(delta.top_level_labels(), ["high vs base"]);
    let de = ColumnKey::new(vec!["high vs base".into(), "DE".into()]);
    let fr = ColumnKey::new(vec!["high vs base".into(), "FR".into()]);
    assert_eq!(delta.numeric_column(&de).expect("DE"), vec![3.0; 4]);
    assert_eq!(delta.numeric_column(&fr).expect("FR"), vec![6.0; 4]);
}

#[test]
fn comparison_fills_missing_objects_with_zero() {
    let reference = Table::from_numeric("snapshot", hourly_index(), vec![("DE", vec![1.0; 4])])
        .expect("reference");
    let variation = Table::from_numeric(
        "snapshot",
        hourly_index(),
        vec![("DE", vec![4.0; 4]), ("NL", vec![2.0; 4])],
    )
    .expect("variation");
    let cmp = DatasetComparison::new(
        Arc::new(TableDataset::new("var").with_table("Node.Price", variation)),
        Arc::new(TableDataset::new("ref").with_table("Node.Price", reference)),
    );

    let delta = cmp.fetch(&price()).expect("delta");
    assert_eq!(delta.numeric_column(&"DE".into()).expect("DE"), vec![3.0; 4]);
    assert_eq!(delta.numeric_column(&"NL".into()).expect("NL"), vec![2.0; 4]);
}

#[test]
fn scen_comp_view_stacks_both_views_under_type_level() {
    let dir = tempfile::tempdir().expect("tempdir");
    let study = common::mock_study(dir.path());

    let table = study.scen_comp().fetch(&price()).expect("fetch");
    assert_eq!(table.top_level_labels(), ["scenario", "comparison"]);
    assert_eq!(table.level_names()[..2], ["type".to_string(), "dataset".to_string()]);

    let comparisons = table.select_top_level("comparison").expect("comparison");
    assert_eq!(comparisons.top_level_labels(), ["high vs base", "low vs base"]);
}

#[test]
fn comparison_naming_unknown_scenario_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = StudyManager::from_scenarios(
        vec![price_scenario_ref("base", 10.0, 2030)],
        &[("base", "missing")],
        dir.path(),
    )
    .expect_err("unknown scenario");
    assert!(matches!(err, StudyError::UnknownDataset(name) if name == "missing"));
}

#[test]
fn unaccepted_flag_is_unknown_flag() {
    let dir = tempfile::tempdir().expect("tempdir");
    let study = common::mock_study(dir.path());
    let base = study.scenario("base").expect("base");
    let err = base.fetch(&Flag::from("Storage.Level")).expect_err("unknown flag");
    assert!(matches!(err, StudyError::UnknownFlag { .. }));
}

#[test]
fn memory_cache_hit_bypasses_raw_fetch() {
    let table = Table::from_numeric("snapshot", hourly_index(), vec![("DE", vec![1.0; 4])])
        .expect("table");
    let cache = Arc::new(MemoryCache::new());
    let dataset = CountingDataset::new("base", "Node.Price", table).with_cache(cache.clone());

    dataset.fetch(&price()).expect("first");
    dataset.fetch(&price()).expect("second");
    assert_eq!(dataset.raw_fetches(), 1);
    assert_eq!(cache.len(), 1);

    let no_cache = ConfigOverrides {
        use_cache: Some(false),
        ..ConfigOverrides::default()
    };
    dataset.fetch_with(&price(), &no_cache).expect("uncached");
    assert_eq!(dataset.raw_fetches(), 2);
}

#[test]
fn file_cache_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let table = Table::from_numeric("snapshot", hourly_index(), vec![("DE", vec![2.5; 4])])
        .expect("table");

    let first = CountingDataset::new("base", "Node.Price", table.clone())
        .with_cache(Arc::new(FileCache::open(dir.path()).expect("cache")));
    first.fetch(&price()).expect("fill");
    assert_eq!(first.raw_fetches(), 1);

    let reopened = Arc::new(FileCache::open(dir.path()).expect("reopen"));
    let keys = reopened.list_keys(Some("base"), None).expect("keys");
    assert_eq!(keys.len(), 1);

    let second = CountingDataset::new("base", "Node.Price", table).with_cache(reopened);
    let cached = second.fetch(&price()).expect("hit");
    assert_eq!(second.raw_fetches(), 0);
    assert_eq!(cached.numeric_column(&"DE".into()).expect("DE"), vec![2.5; 4]);
}

#[test]
fn adding_scenarios_rebuilds_views() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut study = StudyManager::new(dir.path()).expect("study");
    study.add_scenario(Arc::new(price_scenario("base", 1.0)) as DatasetRef);
    study.add_scenario(Arc::new(price_scenario("alt", 2.0)) as DatasetRef);
    study.add_comparison_by_name("alt", "base", None).expect("comparison");

    assert_eq!(study.scen().names(), ["base", "alt"]);
    let delta = study.comp().fetch(&price()).expect("delta");
    let de = ColumnKey::new(vec!["alt vs base".into(), "DE".into()]);
    assert_eq!(delta.numeric_column(&de).expect("DE"), vec![1.0; 4]);
}
