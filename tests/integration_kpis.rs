//! KPI computation over studies, comparisons and configs.

mod common;

use std::sync::Arc;

use scenario_study::config::StudyConfig;
use scenario_study::dataset::{AttributeValue, DatasetRef, ModelPropertyFilter};
use scenario_study::io::export::export_kpis_csv;
use scenario_study::kpi::{
    self, Aggregation, ComparisonDefinition, ComparisonKpiBuilder, DefinitionRef, FlagAggDefinition,
    FlagAggKpiBuilder, KpiCollection, Labelled, Unit, UnitHandling, ValueComparison,
};
use scenario_study::study::StudyManager;

use common::price_scenario_ref;

fn price_study(dir: &std::path::Path) -> StudyManager {
    StudyManager::from_scenarios(
        vec![price_scenario_ref("base", 10.0, 2030), price_scenario_ref("high", 13.0, 2040)],
        &[("high", "base")],
        dir,
    )
    .expect("study")
}

fn value(kpis: &KpiCollection, name: &str, dataset: &str) -> f64 {
    kpis.find(name, dataset)
        .unwrap_or_else(|| panic!("missing KPI `{name}` on `{dataset}`"))
        .value
}

#[test]
fn scenario_and_comparison_kpis() {
    let dir = tempfile::tempdir().expect("tempdir");
    let study = price_study(dir.path());

    let base = FlagAggKpiBuilder::new()
        .for_flag("Node.Price")
        .with_aggregations([Aggregation::Mean, Aggregation::Max])
        .build();
    let comparisons = ComparisonKpiBuilder::new(base.clone())
        .with_comparisons([ValueComparison::Increase, ValueComparison::PercentageIncrease])
        .build();
    let kpis = study.compute_kpis(&base, &comparisons).expect("kpis");

    // 2 scenarios x 2 nodes x 2 aggregations + 1 comparison x 2 nodes x 2 x 2
    assert_eq!(kpis.len(), 16);
    assert_eq!(value(&kpis, "Node.Price Mean DE", "base"), 11.5);
    assert_eq!(value(&kpis, "Node.Price Max FR", "high"), 32.0);
    assert_eq!(value(&kpis, "Node.Price Mean DE Increase", "high vs base"), 3.0);

    let pct = value(&kpis, "Node.Price Mean DE PercentageIncrease", "high vs base");
    assert!((pct - 3.0 / 11.5 * 100.0).abs() < 1e-9);
}

#[test]
fn comparison_kpis_are_named_by_their_own_labels() {
    let dir = tempfile::tempdir().expect("tempdir");
    let study = price_study(dir.path());

    let base: DefinitionRef = Arc::new(
        FlagAggDefinition::new("Node.Price", Aggregation::Mean)
            .with_custom_name("Price")
            .with_target_unit(Unit::EurPerMWh),
    );
    let comparisons: Vec<DefinitionRef> = vec![
        Arc::new(ComparisonDefinition::new(Arc::clone(&base), ValueComparison::Increase)),
        Arc::new(
            ComparisonDefinition::new(Arc::clone(&base), ValueComparison::Delta)
                .with_custom_name("Price shift"),
        ),
    ];
    let kpis = study.compute_kpis(&[base], &comparisons).expect("kpis");

    let scenario_names = kpis.filter("dataset_type", "scenario").attribute_values("custom_name");
    assert_eq!(scenario_names.into_iter().collect::<Vec<_>>(), ["Price DE", "Price FR"]);

    let compared = kpis.filter("dataset_type", "comparison");
    assert_eq!(compared.len(), 4);
    assert!(compared.iter().all(|k| k.attributes.target_unit.is_none()));
    assert_eq!(value(&kpis, "Node.Price Mean DE Increase", "high vs base"), 3.0);
    assert_eq!(value(&kpis, "Price shift FR", "high vs base"), 6.0);
}

#[test]
fn comparison_builder_prefix_reaches_kpi_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    let study = price_study(dir.path());
    let base = FlagAggKpiBuilder::new()
        .for_flag("Node.Price")
        .with_aggregation(Aggregation::Max)
        .with_name_prefix("Scenario")
        .build();
    let comparisons = ComparisonKpiBuilder::new(base.clone())
        .with_comparison(ValueComparison::Increase)
        .with_name_prefix("Shift")
        .build();
    let kpis = study.compute_kpis(&base, &comparisons).expect("kpis");

    assert_eq!(value(&kpis, "Scenario Node.Price Max DE", "base"), 13.0);
    assert_eq!(value(&kpis, "Shift Node.Price Max DE Increase", "high vs base"), 3.0);
    assert!(kpis.find("Scenario Node.Price Max DE Increase", "high vs base").is_none());
}

#[test]
fn kpis_carry_dataset_type_and_attributes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let study = price_study(dir.path());
    let base = FlagAggKpiBuilder::new()
        .for_flag("Node.Price")
        .with_aggregation(Aggregation::Sum)
        .build();
    let comparisons = ComparisonKpiBuilder::new(base.clone())
        .with_comparison(ValueComparison::Delta)
        .build();
    let kpis = study.compute_kpis(&base, &comparisons).expect("kpis");

    let scenarios = kpis.filter("dataset_type", "scenario");
    let compared = kpis.filter("dataset_type", "comparison");
    assert_eq!(scenarios.len(), 4);
    assert_eq!(compared.len(), 2);

    let in_2040 = kpis.filter_by_attributes(&[("year", AttributeValue::Int(2040))]);
    assert_eq!(in_2040.attribute_values("dataset_name").len(), 1);
    assert!(in_2040.iter().all(|k| k.attributes.dataset_name == "high"));

    let groups = scenarios.group_by(&["dataset_name"]);
    assert_eq!(groups.len(), 2);
    assert!(groups.iter().all(|(_, group)| group.len() == 2));
}

#[test]
fn objects_selected_by_model_properties() {
    let dir = tempfile::tempdir().expect("tempdir");
    let study = common::mock_study(dir.path());
    let defs = FlagAggKpiBuilder::new()
        .for_flag("Generator.Generation")
        .with_aggregation(Aggregation::Sum)
        .for_objects_with_model_properties(ModelPropertyFilter::new().equals("carrier", "gas"))
        .build();

    let base: Vec<DatasetRef> = vec![Arc::clone(study.scenario("base").expect("base"))];
    let kpis = kpi::compute_kpis(&base, &defs).expect("kpis");
    let objects = kpis.attribute_values("object_name");
    assert_eq!(
        objects.into_iter().collect::<Vec<_>>(),
        ["DE gas".to_string(), "NL gas".to_string()]
    );
}

#[test]
fn definitions_needing_missing_flags_are_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let study = price_study(dir.path());
    let defs = FlagAggKpiBuilder::new()
        .for_flags(["Node.Price", "Line.Flow"])
        .with_aggregation(Aggregation::Mean)
        .build();
    let kpis = study.compute_kpis(&defs, &[]).expect("kpis");
    assert_eq!(kpis.attribute_values("flag").into_iter().collect::<Vec<_>>(), ["Node.Price"]);
}

#[test]
fn demo_config_computes_and_exports_kpis() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = StudyConfig::demo();
    config.study.export_folder = dir.path().join("export");
    config.study.cache = "none".to_string();
    for scenario in &mut config.scenarios {
        scenario.periods = 24;
    }
    assert!(config.validate().is_empty());

    let study = config.build_study().expect("study");
    let (scenario_defs, comparison_defs) = config.kpi_definitions().expect("definitions");
    let kpis = study.compute_kpis(&scenario_defs, &comparison_defs).expect("kpis");
    assert!(!kpis.filter("dataset_type", "comparison").is_empty());

    let mean_de_high = value(&kpis, "Node.Price Mean DE Increase", "high_prices vs base");
    assert!(mean_de_high > 0.0, "higher price scale should raise prices");

    let path = study.export_path("kpis.csv");
    export_kpis_csv(&kpis, &UnitHandling::AutoConvert, &path).expect("export");
    let mut rdr = csv::Reader::from_path(&path).expect("reader");
    assert_eq!(rdr.records().count(), kpis.len());
}
