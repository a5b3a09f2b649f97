//! scenario-study entry point: CLI wiring and config-driven study construction.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scenario_study::config::StudyConfig;
use scenario_study::dataset::{Dataset, Flag};
use scenario_study::io::csv_table::write_table_to_path;
use scenario_study::io::export::export_kpis_csv;
use scenario_study::kpi::UnitHandling;
use scenario_study::reporting::{print_kpi_table, render_table_preview};

/// Rows shown when printing a fetched table.
const PREVIEW_ROWS: usize = 24;

/// Compare energy-market scenarios and compute KPIs across them.
#[derive(Debug, Parser)]
#[command(name = "scenario-study", version)]
struct Cli {
    /// Load the study from a TOML config file
    #[arg(long, value_name = "PATH", conflicts_with = "preset")]
    config: Option<PathBuf>,

    /// Use a built-in preset (demo, single)
    #[arg(long, value_name = "NAME")]
    preset: Option<String>,

    /// Override the seed of every mock scenario
    #[arg(long)]
    seed: Option<u64>,

    /// Fetch a flag (e.g. Node.Price) and print it
    #[arg(long, value_name = "FLAG")]
    fetch: Option<String>,

    /// View to fetch from: scen, comp, scen-comp or a dataset name
    #[arg(long, default_value = "scen", requires = "fetch")]
    view: String,

    /// Write the fetched table to CSV
    #[arg(long, value_name = "PATH", requires = "fetch")]
    out: Option<PathBuf>,

    /// Write computed KPIs to CSV
    #[arg(long, value_name = "PATH")]
    kpis_out: Option<PathBuf>,

    /// Start the REST API server after computing KPIs
    #[cfg(feature = "api")]
    #[arg(long)]
    serve: bool,

    /// API server port
    #[cfg(feature = "api")]
    #[arg(long, default_value_t = 3000)]
    port: u16,
}

fn load_config(cli: &Cli) -> anyhow::Result<StudyConfig> {
    // --config takes priority, then --preset, then the demo preset
    let mut config = match (&cli.config, &cli.preset) {
        (Some(path), _) => StudyConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        (None, Some(name)) => StudyConfig::from_preset(name)?,
        (None, None) => StudyConfig::demo(),
    };
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        bail!("{} invalid config field(s)", errors.len());
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scenario_study=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!(study = %config.study.name, scenarios = config.scenarios.len(), "loaded config");

    let study = config.build_study().context("building study")?;
    let (scenario_defs, comparison_defs) = config.kpi_definitions()?;
    let kpis = study
        .compute_kpis(&scenario_defs, &comparison_defs)
        .context("computing KPIs")?;
    print_kpi_table(&kpis);

    if let Some(path) = &cli.kpis_out {
        export_kpis_csv(&kpis, &UnitHandling::Original, path)
            .with_context(|| format!("writing KPIs to {}", path.display()))?;
        eprintln!("KPIs written to {}", path.display());
    }

    if let Some(flag) = &cli.fetch {
        let dataset = study
            .view(&cli.view)
            .with_context(|| format!("unknown view or dataset `{}`", cli.view))?;
        let table = dataset
            .fetch(&Flag::from(flag.as_str()))
            .with_context(|| format!("fetching {flag} from {}", cli.view))?;
        println!("\n--- {flag} ({}) ---", dataset.name());
        println!("{}", render_table_preview(&table, PREVIEW_ROWS));
        if let Some(path) = &cli.out {
            write_table_to_path(&table, path)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Table written to {}", path.display());
        }
    }

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        use scenario_study::api::{self, AppState};

        let state = Arc::new(AppState { study, kpis });
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
        rt.block_on(api::serve(state, addr))
            .with_context(|| format!("serving API on {addr}"))?;
    }

    Ok(())
}
