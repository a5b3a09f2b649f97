//! Ordered container of computed KPIs with attribute-based querying.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;

use super::indicator::{Kpi, NAMING_ATTRIBUTES};
use super::units::{Unit, common_pretty_unit};
use crate::dataset::{AttributeValue, Dataset, Flag, ModelPropertyFilter};
use crate::error::Result;

/// How values are expressed when exporting records.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum UnitHandling {
    /// Values in the unit they were computed in.
    #[default]
    Original,
    /// Each KPI in its own readable unit (or its target unit).
    AutoConvert,
    /// Every KPI of the unit's dimension in this unit; others unchanged.
    Target(Unit),
    /// Per-flag units; flags not listed keep their unit.
    PerFlag(BTreeMap<Flag, Unit>),
    /// One readable unit per source unit, shared across the collection.
    NormalizeToCollection,
}

/// Flat, serializable view of one KPI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiRecord {
    pub name: String,
    pub dataset_name: String,
    pub value: f64,
    pub unit: String,
    pub attributes: BTreeMap<String, AttributeValue>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KpiCollection {
    kpis: Vec<Kpi>,
}

impl KpiCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kpi: Kpi) {
        self.kpis.push(kpi);
    }

    pub fn extend(&mut self, kpis: impl IntoIterator<Item = Kpi>) {
        self.kpis.extend(kpis);
    }

    pub fn clear(&mut self) {
        self.kpis.clear();
    }

    pub fn len(&self) -> usize {
        self.kpis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kpis.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Kpi> {
        self.kpis.iter()
    }

    pub fn as_slice(&self) -> &[Kpi] {
        &self.kpis
    }

    /// First KPI with this display name on this dataset.
    pub fn find(&self, name: &str, dataset_name: &str) -> Option<&Kpi> {
        self.kpis
            .iter()
            .find(|k| k.attributes.dataset_name == dataset_name && k.name() == name)
    }

    pub fn filter_by(&self, predicate: impl Fn(&Kpi) -> bool) -> Self {
        self.kpis.iter().filter(|k| predicate(k)).cloned().collect()
    }

    /// KPIs whose attribute `key` renders the same as `value`, so `2030`
    /// matches both integer and text attributes.
    pub fn filter(&self, key: &str, value: impl Into<AttributeValue>) -> Self {
        let wanted = value.into().to_string();
        self.filter_by(|k| k.attributes.get(key).is_some_and(|v| v.to_string() == wanted))
    }

    /// KPIs matching every `(key, value)` pair.
    pub fn filter_by_attributes(&self, criteria: &[(&str, AttributeValue)]) -> Self {
        let wanted: Vec<(&str, String)> = criteria.iter().map(|(k, v)| (*k, v.to_string())).collect();
        self.filter_by(|kpi| {
            let map = kpi.attributes.as_map();
            wanted
                .iter()
                .all(|(k, v)| map.get(*k).is_some_and(|actual| actual.to_string() == *v))
        })
    }

    /// KPIs whose object passes `filter` on the model table of `source`.
    /// KPIs without a model flag or object are dropped.
    ///
    /// # Errors
    ///
    /// Propagates model fetch and filter errors.
    pub fn filter_by_model_properties(
        &self,
        source: &dyn Dataset,
        filter: &ModelPropertyFilter,
    ) -> Result<Self> {
        let mut passing: HashMap<Flag, HashSet<String>> = HashMap::new();
        let mut out = Self::new();
        for kpi in &self.kpis {
            let (Some(model_flag), Some(object)) = (&kpi.attributes.model_flag, &kpi.attributes.object_name)
            else {
                continue;
            };
            if !passing.contains_key(model_flag) {
                let objects = filter.apply(&source.fetch(model_flag)?)?;
                passing.insert(model_flag.clone(), objects.into_iter().collect());
            }
            if passing.get(model_flag).is_some_and(|set| set.contains(object)) {
                out.add(kpi.clone());
            }
        }
        Ok(out)
    }

    /// Splits by the rendered values of `keys`, in first-seen order. A missing
    /// attribute groups under an empty string.
    pub fn group_by(&self, keys: &[&str]) -> Vec<(Vec<String>, Self)> {
        let mut groups: Vec<(Vec<String>, Self)> = Vec::new();
        for kpi in &self.kpis {
            let map = kpi.attributes.as_map();
            let group_key: Vec<String> = keys
                .iter()
                .map(|k| map.get(*k).map(ToString::to_string).unwrap_or_default())
                .collect();
            match groups.iter_mut().find(|(k, _)| *k == group_key) {
                Some((_, members)) => members.add(kpi.clone()),
                None => groups.push((group_key, std::iter::once(kpi.clone()).collect())),
            }
        }
        groups
    }

    /// KPIs that share every attribute with `reference` except the `vary`
    /// keys and the naming attributes, e.g. the same KPI on other datasets.
    /// `reference` itself is excluded.
    pub fn related(&self, reference: &Kpi, vary: &[&str]) -> Self {
        let strip = |kpi: &Kpi| {
            let mut map = kpi.attributes.as_map();
            for key in vary.iter().chain(NAMING_ATTRIBUTES.iter()) {
                map.remove(*key);
            }
            map
        };
        let target = strip(reference);
        self.filter_by(|k| !std::ptr::eq(k, reference) && *k != *reference && strip(k) == target)
    }

    /// Distinct rendered values of one attribute.
    pub fn attribute_values(&self, key: &str) -> BTreeSet<String> {
        self.kpis
            .iter()
            .filter_map(|k| k.attributes.get(key))
            .map(|v| v.to_string())
            .collect()
    }

    /// Attributes with the same value on every KPI.
    pub fn common_attributes(&self) -> BTreeMap<String, AttributeValue> {
        let mut iter = self.kpis.iter();
        let Some(first) = iter.next() else {
            return BTreeMap::new();
        };
        let mut common = first.attributes.as_map();
        for kpi in iter {
            let map = kpi.attributes.as_map();
            common.retain(|k, v| map.get(k) == Some(v));
        }
        common
    }

    /// Flat records with values expressed per `handling`.
    pub fn to_records(&self, handling: &UnitHandling) -> Vec<KpiRecord> {
        let shared = match handling {
            UnitHandling::NormalizeToCollection => self.collection_units(),
            _ => HashMap::new(),
        };
        self.kpis
            .iter()
            .map(|kpi| {
                let (value, unit) = match handling {
                    UnitHandling::Original => (kpi.value, kpi.unit()),
                    UnitHandling::AutoConvert => kpi.pretty(),
                    UnitHandling::Target(target) => converted(kpi, *target),
                    UnitHandling::PerFlag(units) => match units.get(&kpi.attributes.flag) {
                        Some(target) => converted(kpi, *target),
                        None => (kpi.value, kpi.unit()),
                    },
                    UnitHandling::NormalizeToCollection => match shared.get(&kpi.unit()) {
                        Some(target) => converted(kpi, *target),
                        None => (kpi.value, kpi.unit()),
                    },
                };
                let mut attributes = kpi.attributes.as_map();
                attributes.insert("unit".into(), AttributeValue::from(unit.symbol()));
                KpiRecord {
                    name: kpi.name(),
                    dataset_name: kpi.attributes.dataset_name.clone(),
                    value,
                    unit: unit.symbol().to_string(),
                    attributes,
                }
            })
            .collect()
    }

    fn collection_units(&self) -> HashMap<Unit, Unit> {
        let mut by_unit: HashMap<Unit, Vec<f64>> = HashMap::new();
        for kpi in &self.kpis {
            by_unit.entry(kpi.unit()).or_default().push(kpi.value);
        }
        by_unit
            .into_iter()
            .filter_map(|(unit, values)| common_pretty_unit(unit, &values).map(|u| (unit, u)))
            .collect()
    }
}

fn converted(kpi: &Kpi, target: Unit) -> (f64, Unit) {
    match kpi.value_in(target) {
        Some(v) => (v, target),
        None => (kpi.value, kpi.unit()),
    }
}

impl FromIterator<Kpi> for KpiCollection {
    fn from_iter<I: IntoIterator<Item = Kpi>>(iter: I) -> Self {
        Self {
            kpis: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Kpi>> for KpiCollection {
    fn from(kpis: Vec<Kpi>) -> Self {
        Self { kpis }
    }
}

impl IntoIterator for KpiCollection {
    type Item = Kpi;
    type IntoIter = std::vec::IntoIter<Kpi>;

    fn into_iter(self) -> Self::IntoIter {
        self.kpis.into_iter()
    }
}

impl<'a> IntoIterator for &'a KpiCollection {
    type Item = &'a Kpi;
    type IntoIter = std::slice::Iter<'a, Kpi>;

    fn into_iter(self) -> Self::IntoIter {
        self.kpis.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::aggregation::Aggregation;
    use crate::kpi::indicator::KpiAttributes;

    fn kpi(dataset: &str, object: &str, agg: Aggregation, value: f64, unit: Unit) -> Kpi {
        let mut attrs = KpiAttributes::new("Generator.Generation");
        attrs.dataset_name = dataset.into();
        attrs.dataset_type = "scenario".into();
        attrs.object_name = Some(object.into());
        attrs.aggregation = Some(agg);
        attrs.unit = Some(unit);
        attrs.model_flag = Some("Generator.Model".into());
        Kpi::new(value, attrs)
    }

    fn sample() -> KpiCollection {
        KpiCollection::from(vec![
            kpi("base", "g1", Aggregation::Sum, 12_000.0, Unit::MWh),
            kpi("base", "g2", Aggregation::Sum, 300.0, Unit::MWh),
            kpi("high", "g1", Aggregation::Sum, 15_000.0, Unit::MWh),
            kpi("high", "g1", Aggregation::Max, 80.0, Unit::MW),
        ])
    }

    #[test]
    fn filter_and_attribute_values() {
        let kpis = sample();
        assert_eq!(kpis.filter("dataset_name", "high").len(), 2);
        assert_eq!(kpis.filter("aggregation", "Sum").len(), 3);
        assert_eq!(
            kpis.filter_by_attributes(&[("dataset_name", "base".into()), ("object_name", "g2".into())])
                .len(),
            1
        );
        let datasets: Vec<String> = kpis.attribute_values("dataset_name").into_iter().collect();
        assert_eq!(datasets, ["base", "high"]);
    }

    #[test]
    fn group_by_keeps_first_seen_order() {
        let groups = sample().group_by(&["dataset_name"]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, ["base"]);
        assert_eq!(groups[1].1.len(), 2);
    }

    #[test]
    fn related_finds_same_kpi_on_other_datasets() {
        let kpis = sample();
        let reference = &kpis.as_slice()[0];
        let related = kpis.related(reference, &["dataset_name"]);
        assert_eq!(related.len(), 1);
        assert_eq!(related.as_slice()[0].attributes.dataset_name, "high");
        assert_eq!(related.as_slice()[0].value, 15_000.0);
    }

    #[test]
    fn common_attributes_are_shared_values() {
        let common = sample().common_attributes();
        assert_eq!(common.get("dataset_type"), Some(&AttributeValue::from("scenario")));
        assert!(!common.contains_key("dataset_name"));
        assert!(KpiCollection::new().common_attributes().is_empty());
    }

    #[test]
    fn records_convert_units() {
        let kpis = sample();
        let original = kpis.to_records(&UnitHandling::Original);
        assert_eq!(original[0].unit, "MWh");
        assert_eq!(original[0].name, "Generator.Generation Sum g1");

        let auto = kpis.to_records(&UnitHandling::AutoConvert);
        assert_eq!((auto[0].value, auto[0].unit.as_str()), (12.0, "GWh"));
        assert_eq!((auto[1].value, auto[1].unit.as_str()), (300.0, "MWh"));

        let target = kpis.to_records(&UnitHandling::Target(Unit::GWh));
        assert_eq!(target[1].value, 0.3);
        assert_eq!(target[3].unit, "MW");

        let shared = kpis.to_records(&UnitHandling::NormalizeToCollection);
        assert_eq!(shared[0].unit, "GWh");
        assert_eq!(shared[1].unit, "GWh");
        assert_eq!(shared[3].unit, "MW");
        assert_eq!(shared[0].attributes.get("unit"), Some(&AttributeValue::from("GWh")));
    }
}
