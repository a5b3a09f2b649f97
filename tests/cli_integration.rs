//! Runs the binary against study files and checks its outputs.

use std::fs;
use std::process::Command;

use scenario_study::config::StudyConfig;

#[test]
fn bundled_study_files_are_valid() {
    for entry in fs::read_dir("studies").expect("studies folder") {
        let path = entry.expect("entry").path();
        if path.extension().is_some_and(|e| e == "toml") {
            let config = StudyConfig::from_toml_file(&path)
                .unwrap_or_else(|e| panic!("{}: {e}", path.display()));
            let errors = config.validate();
            assert!(errors.is_empty(), "{}: {errors:?}", path.display());
        }
    }
}

#[test]
fn cli_exports_kpis_and_fetched_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    let study = dir.path().join("study.toml");
    let export = dir.path().join("export");
    fs::write(
        &study,
        format!(
            r#"
            [study]
            name = "cli"
            export_folder = "{}"
            cache = "none"

            [[scenario]]
            name = "base"
            periods = 24

            [[scenario]]
            name = "high"
            periods = 24
            price_scale = 1.2

            [[comparison]]
            variation = "high"
            reference = "base"

            [[kpi]]
            flags = ["Node.Price"]
            aggregations = ["Mean"]
            comparisons = ["Increase"]
            "#,
            export.display().to_string().replace('\\', "/")
        ),
    )
    .expect("write study");

    let kpis_out = dir.path().join("kpis.csv");
    let table_out = dir.path().join("delta.csv");
    let output = Command::new(env!("CARGO_BIN_EXE_scenario-study"))
        .arg("--config")
        .arg(&study)
        .arg("--kpis-out")
        .arg(&kpis_out)
        .args(["--fetch", "Node.Price", "--view", "comp", "--out"])
        .arg(&table_out)
        .output()
        .expect("scenario-study process should run");

    assert!(
        output.status.success(),
        "run failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.contains("Node.Price Mean DE Increase"));

    let kpis = fs::read_to_string(&kpis_out).expect("kpis csv");
    // header + 2 scenarios x 3 nodes + 1 comparison x 3 nodes
    assert_eq!(kpis.lines().count(), 10);

    let table = fs::read_to_string(&table_out).expect("table csv");
    assert!(table.lines().next().unwrap_or("").contains("high vs base"));
}

#[test]
fn invalid_config_fails_with_field_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    let study = dir.path().join("bad.toml");
    fs::write(&study, "[[scenario]]\nname = \"base\"\nperiods = 0\n").expect("write");

    let output = Command::new(env!("CARGO_BIN_EXE_scenario-study"))
        .arg("--config")
        .arg(&study)
        .output()
        .expect("process");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("scenario[0].periods"));
}
