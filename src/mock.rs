//! Seeded synthetic platform for demos and tests.
//!
//! Produces a small three-node market with hourly prices, generator
//! dispatch, line flows and a derived revenue flag. The same seed always
//! yields the same tables.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::dataset::{
    Attributes, Dataset, FetchContext, Flag, FlagIndex, LinkCollection, PlatformBuilder,
    TableDataset,
};
use crate::error::{Result, StudyError};
use crate::kpi::Unit;
use crate::table::{Cell, ColumnKey, Table};

pub const NODE_MODEL: &str = "Node.Model";
pub const GENERATOR_MODEL: &str = "Generator.Model";
pub const LINE_MODEL: &str = "Line.Model";
pub const NODE_PRICE: &str = "Node.Price";
pub const GENERATOR_GENERATION: &str = "Generator.Generation";
pub const GENERATOR_REVENUE: &str = "Generator.Revenue";
pub const LINE_FLOW: &str = "Line.Flow";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `(node, country, base price EUR/MWh)`
const NODES: [(&str, &str, f64); 3] = [("DE", "Germany", 55.0), ("FR", "France", 48.0), ("NL", "Netherlands", 60.0)];

/// `(generator, node, carrier, capacity MW, marginal cost EUR/MWh)`
const GENERATORS: [(&str, &str, &str, f64, f64); 5] = [
    ("DE solar", "DE", "solar", 400.0, 0.0),
    ("DE gas", "DE", "gas", 300.0, 58.0),
    ("FR nuclear", "FR", "nuclear", 600.0, 12.0),
    ("NL wind", "NL", "wind", 350.0, 0.0),
    ("NL gas", "NL", "gas", 250.0, 62.0),
];

/// `(line, from node, to node, capacity MW)`
const LINES: [(&str, &str, &str, f64); 2] = [("DE-FR", "DE", "FR", 300.0), ("FR-NL", "FR", "NL", 200.0)];

/// Utility function to generate Gaussian noise using the Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }
    let u1: f64 = rng.random::<f64>().clamp(1e-9, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// Parameters of a synthetic scenario.
///
/// # Examples
///
/// ```
/// use scenario_study::mock::MockPlatform;
/// use scenario_study::dataset::Dataset;
///
/// let base = MockPlatform::new(42, 1.0, 48).build("base").unwrap();
/// let prices = base.fetch(&"Node.Price".into()).unwrap();
/// assert_eq!(prices.nrows(), 48);
/// ```
#[derive(Debug, Clone)]
pub struct MockPlatform {
    /// Master random seed.
    pub seed: u64,
    /// Multiplier applied to every node's base price.
    pub price_scale: f64,
    /// Number of hourly periods.
    pub periods: usize,
    /// First timestamp of the series.
    pub start: NaiveDateTime,
    /// Relative standard deviation of price noise.
    pub price_noise: f64,
    pub attributes: Attributes,
}

impl MockPlatform {
    pub fn new(seed: u64, price_scale: f64, periods: usize) -> Self {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        Self {
            seed,
            price_scale,
            periods,
            start,
            price_noise: 0.08,
            attributes: Attributes::new(),
        }
    }

    pub fn with_start(mut self, start: NaiveDateTime) -> Self {
        self.start = start;
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Model links and units for every mock flag.
    pub fn flag_index() -> FlagIndex {
        FlagIndex::empty()
            .with_model_flag(NODE_PRICE, NODE_MODEL)
            .with_model_flag(GENERATOR_GENERATION, GENERATOR_MODEL)
            .with_model_flag(GENERATOR_REVENUE, GENERATOR_MODEL)
            .with_model_flag(LINE_FLOW, LINE_MODEL)
            .with_unit(NODE_PRICE, Unit::EurPerMWh)
            .with_unit(GENERATOR_GENERATION, Unit::MWh)
            .with_unit(GENERATOR_REVENUE, Unit::Eur)
            .with_unit(LINE_FLOW, Unit::MW)
    }

    /// Builds the platform dataset named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StudyError::InvalidTable`] if `periods` is zero.
    pub fn build(&self, name: impl Into<String>) -> Result<LinkCollection> {
        if self.periods == 0 {
            return Err(StudyError::InvalidTable("mock platform needs at least one period".into()));
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let index = self.time_index();

        let prices = self.node_prices(&mut rng, &index)?;
        let generation = generator_dispatch(&mut rng, &index, &prices)?;
        let flows = line_flows(&mut rng, &index, &prices)?;

        let tables = TableDataset::new("mock_tables")
            .with_table(NODE_MODEL, node_model()?)
            .with_table(GENERATOR_MODEL, generator_model()?)
            .with_table(LINE_MODEL, line_model()?)
            .with_table(NODE_PRICE, prices)
            .with_table(GENERATOR_GENERATION, generation)
            .with_table(LINE_FLOW, flows);

        PlatformBuilder::new(name)
            .interpreter(tables)
            .derived(
                GENERATOR_REVENUE,
                vec![GENERATOR_GENERATION.into(), NODE_PRICE.into(), GENERATOR_MODEL.into()],
                generator_revenue,
            )
            .flag_index(Self::flag_index())
            .attributes(self.attributes.clone())
            .build()
    }

    fn time_index(&self) -> Vec<String> {
        (0..self.periods)
            .map(|h| (self.start + Duration::hours(h as i64)).format(TIMESTAMP_FORMAT).to_string())
            .collect()
    }

    /// Daily sinusoid around each node's base price plus noise.
    fn node_prices(&self, rng: &mut StdRng, index: &[String]) -> Result<Table> {
        let mut table = Table::new("snapshot", index.to_vec());
        table.set_level_names(vec!["Node".into()])?;
        for (node, _, base) in NODES {
            let base = base * self.price_scale;
            let values = (0..index.len())
                .map(|h| {
                    let angle = 2.0 * std::f64::consts::PI * (h % 24) as f64 / 24.0;
                    let shape = 1.0 + 0.25 * (angle - 2.0).sin();
                    base * (shape + gaussian_noise(rng, self.price_noise))
                })
                .map(Cell::Number)
                .collect();
            table.push_column(ColumnKey::single(node), values)?;
        }
        Ok(table)
    }
}

fn node_model() -> Result<Table> {
    let mut table = Table::new("Node", NODES.iter().map(|(n, _, _)| n.to_string()).collect());
    table.set_level_names(vec!["property".into()])?;
    table.push_column(
        "country".into(),
        NODES.iter().map(|(_, c, _)| Cell::from(*c)).collect(),
    )?;
    table.push_column("market".into(), NODES.iter().map(|_| Cell::from("CWE")).collect())?;
    Ok(table)
}

fn generator_model() -> Result<Table> {
    let mut table = Table::new("Generator", GENERATORS.iter().map(|g| g.0.to_string()).collect());
    table.set_level_names(vec!["property".into()])?;
    table.push_column("node".into(), GENERATORS.iter().map(|g| Cell::from(g.1)).collect())?;
    table.push_column("carrier".into(), GENERATORS.iter().map(|g| Cell::from(g.2)).collect())?;
    table.push_column("p_nom".into(), GENERATORS.iter().map(|g| Cell::Number(g.3)).collect())?;
    table.push_column(
        "marginal_cost".into(),
        GENERATORS.iter().map(|g| Cell::Number(g.4)).collect(),
    )?;
    Ok(table)
}

fn line_model() -> Result<Table> {
    let mut table = Table::new("Line", LINES.iter().map(|l| l.0.to_string()).collect());
    table.set_level_names(vec!["property".into()])?;
    table.push_column("node_from".into(), LINES.iter().map(|l| Cell::from(l.1)).collect())?;
    table.push_column("node_to".into(), LINES.iter().map(|l| Cell::from(l.2)).collect())?;
    table.push_column("s_nom".into(), LINES.iter().map(|l| Cell::Number(l.3)).collect())?;
    Ok(table)
}

fn price_at(prices: &Table, node: &str, row: usize) -> Result<f64> {
    prices
        .column(&ColumnKey::single(node))
        .and_then(|cells| cells.get(row))
        .and_then(Cell::as_f64)
        .ok_or_else(|| StudyError::InvalidTable(format!("no price for node `{node}` at row {row}")))
}

/// Renewables follow a weather profile; thermal units run when the local
/// price covers their marginal cost.
fn generator_dispatch(rng: &mut StdRng, index: &[String], prices: &Table) -> Result<Table> {
    let mut table = Table::new("snapshot", index.to_vec());
    table.set_level_names(vec!["Generator".into()])?;
    for (generator, node, carrier, p_nom, marginal_cost) in GENERATORS {
        let mut values = Vec::with_capacity(index.len());
        for row in 0..index.len() {
            let hour = (row % 24) as f64;
            let availability = match carrier {
                "solar" => (std::f64::consts::PI * (hour - 6.0) / 12.0).sin().max(0.0),
                "wind" => (0.45 + gaussian_noise(rng, 0.2)).clamp(0.0, 1.0),
                _ if price_at(prices, node, row)? >= marginal_cost => 0.9,
                _ => 0.1,
            };
            values.push(Cell::Number(p_nom * availability));
        }
        table.push_column(ColumnKey::single(generator), values)?;
    }
    Ok(table)
}

/// Flow follows the price spread from the cheap to the expensive node.
fn line_flows(rng: &mut StdRng, index: &[String], prices: &Table) -> Result<Table> {
    let mut table = Table::new("snapshot", index.to_vec());
    table.set_level_names(vec!["Line".into()])?;
    for (line, from, to, s_nom) in LINES {
        let mut values = Vec::with_capacity(index.len());
        for row in 0..index.len() {
            let spread = price_at(prices, to, row)? - price_at(prices, from, row)?;
            let flow = (spread * 10.0 + gaussian_noise(rng, 0.05 * s_nom)).clamp(-s_nom, s_nom);
            values.push(Cell::Number(flow));
        }
        table.push_column(ColumnKey::single(line), values)?;
    }
    Ok(table)
}

/// Generation times the price at each generator's node.
fn generator_revenue(parent: &dyn Dataset, _ctx: &FetchContext<'_>) -> Result<Table> {
    let generation = parent.fetch(&Flag::from(GENERATOR_GENERATION))?;
    let prices = parent.fetch(&Flag::from(NODE_PRICE))?;
    let model = parent.fetch(&Flag::from(GENERATOR_MODEL))?;

    let prices = prices.reindex_rows(generation.index());
    let mut table = Table::new(generation.index_name(), generation.index().to_vec());
    table.set_level_names(generation.level_names().to_vec())?;
    for (key, cells) in generation.iter_columns() {
        let generator = key.last().unwrap_or_default();
        let node = model
            .get(generator, &ColumnKey::single("node"))
            .and_then(Cell::as_str)
            .ok_or_else(|| StudyError::InvalidTable(format!("generator `{generator}` has no node")))?;
        let price_cells = prices
            .column(&ColumnKey::single(node))
            .ok_or_else(|| StudyError::InvalidTable(format!("no price for node `{node}`")))?;
        let revenue = cells
            .iter()
            .zip(price_cells)
            .map(|(g, p)| match (g.as_f64(), p.as_f64()) {
                (Some(g), Some(p)) => Cell::Number(g * p),
                _ => Cell::Empty,
            })
            .collect();
        table.push_column(key.clone(), revenue)?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_tables() {
        let a = MockPlatform::new(7, 1.0, 48).build("a").expect("a");
        let b = MockPlatform::new(7, 1.0, 48).build("b").expect("b");
        let c = MockPlatform::new(8, 1.0, 48).build("c").expect("c");
        let flag = Flag::from(NODE_PRICE);
        assert_eq!(a.fetch(&flag).expect("a"), b.fetch(&flag).expect("b"));
        assert_ne!(a.fetch(&flag).expect("a"), c.fetch(&flag).expect("c"));
    }

    #[test]
    fn exposes_every_flag_with_units() {
        let platform = MockPlatform::new(1, 1.0, 24).build("base").expect("platform");
        for flag in [NODE_MODEL, GENERATOR_MODEL, LINE_MODEL, NODE_PRICE, GENERATOR_GENERATION, GENERATOR_REVENUE, LINE_FLOW] {
            assert!(platform.flag_is_accepted(&flag.into()), "{flag}");
        }
        let index = platform.flag_index();
        assert_eq!(index.unit(&NODE_PRICE.into()), Some(Unit::EurPerMWh));
        assert_eq!(index.linked_model_flag(&GENERATOR_GENERATION.into()), Some(Flag::from(GENERATOR_MODEL)));
    }

    #[test]
    fn price_scale_shifts_prices() {
        let flag = Flag::from(NODE_PRICE);
        let mean = |scale: f64| {
            let table = MockPlatform::new(3, scale, 48).build("x").expect("platform").fetch(&flag).expect("fetch");
            let de = table.numeric_column(&"DE".into()).expect("DE");
            de.iter().sum::<f64>() / de.len() as f64
        };
        assert!((mean(2.0) / mean(1.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn revenue_is_generation_times_node_price() {
        let platform = MockPlatform::new(5, 1.0, 24).build("base").expect("platform");
        let generation = platform.fetch(&GENERATOR_GENERATION.into()).expect("generation");
        let prices = platform.fetch(&NODE_PRICE.into()).expect("prices");
        let revenue = platform.fetch(&GENERATOR_REVENUE.into()).expect("revenue");

        let g = generation.numeric_column(&"FR nuclear".into()).expect("g");
        let p = prices.numeric_column(&"FR".into()).expect("p");
        let r = revenue.numeric_column(&"FR nuclear".into()).expect("r");
        for i in 0..24 {
            assert!((r[i] - g[i] * p[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn solar_is_zero_at_night() {
        let platform = MockPlatform::new(5, 1.0, 24).build("base").expect("platform");
        let generation = platform.fetch(&GENERATOR_GENERATION.into()).expect("generation");
        let solar = generation.numeric_column(&"DE solar".into()).expect("solar");
        assert_eq!(solar[0], 0.0);
        assert!(solar[12] > 0.0);
    }

    #[test]
    fn zero_periods_rejected() {
        assert!(MockPlatform::new(1, 1.0, 0).build("x").is_err());
    }
}
