use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::model::{Measure, MetricRecord, Variant};

/// Sample -> variant -> metrics, with samples kept in first-seen order.
#[derive(Debug, Default)]
pub struct Aggregate {
    samples: Vec<(String, BTreeMap<Variant, MetricRecord>)>,
    lookup: HashMap<String, usize>,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a finished record. A repeated (sample, variant) pair keeps the
    /// latest scalar values and sums additive ones.
    pub fn insert(&mut self, sample: &str, variant: Variant, record: MetricRecord) {
        let idx = match self.lookup.get(sample) {
            Some(&idx) => idx,
            None => {
                self.samples.push((sample.to_string(), BTreeMap::new()));
                self.lookup.insert(sample.to_string(), self.samples.len() - 1);
                self.samples.len() - 1
            }
        };
        let variants = &mut self.samples[idx].1;
        match variants.get_mut(&variant) {
            Some(existing) => existing.absorb(record),
            None => {
                variants.insert(variant, record);
            }
        }
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = (String, Variant, MetricRecord)>) {
        for (sample, variant, record) in entries {
            self.insert(&sample, variant, record);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample names in first-seen order.
    pub fn samples(&self) -> impl Iterator<Item = &str> {
        self.samples.iter().map(|(name, _)| name.as_str())
    }

    pub fn variants(&self, sample: &str) -> Option<&BTreeMap<Variant, MetricRecord>> {
        self.lookup.get(sample).map(|&idx| &self.samples[idx].1)
    }

    pub fn get(&self, sample: &str, variant: &Variant) -> Option<&MetricRecord> {
        self.variants(sample)?.get(variant)
    }

    /// Every variant seen for any sample, in sorted order.
    pub fn variant_keys(&self) -> BTreeSet<Variant> {
        self.samples
            .iter()
            .flat_map(|(_, variants)| variants.keys().cloned())
            .collect()
    }

    /// Sample names ordered ascending by `key`. The sort is stable and
    /// samples without a key value go last in first-seen order.
    pub fn ordered_by<F>(&self, key: F) -> Vec<&str>
    where
        F: Fn(&BTreeMap<Variant, MetricRecord>) -> Measure,
    {
        let mut keyed: Vec<(&str, Option<f64>)> = self
            .samples
            .iter()
            .map(|(name, variants)| (name.as_str(), key(variants).value()))
            .collect();
        keyed.sort_by(|a, b| match (a.1, b.1) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        keyed.into_iter().map(|(name, _)| name).collect()
    }
}

impl Serialize for Aggregate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Variants<'a>(&'a BTreeMap<Variant, MetricRecord>);

        impl Serialize for Variants<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for (variant, record) in self.0 {
                    map.serialize_entry(&variant.to_string(), record)?;
                }
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(self.samples.len()))?;
        for (name, variants) in &self.samples {
            map.serialize_entry(name, &Variants(variants))?;
        }
        map.end()
    }
}
