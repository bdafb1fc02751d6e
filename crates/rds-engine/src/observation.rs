//! Per-frame observations and the run's time series

use serde::{Deserialize, Serialize};

/// Detection counts of one sampled frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub potholes: u32,
    pub rough: u32,
    pub lanes: u32,
    pub signs: u32,
}

impl Observation {
    pub fn new(potholes: u32, rough: u32, lanes: u32, signs: u32) -> Self {
        Self {
            potholes,
            rough,
            lanes,
            signs,
        }
    }
}

/// Observations in sampling order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationSeries(Vec<Observation>);

impl ObservationSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observation: Observation) {
        self.0.push(observation);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Observation] {
        &self.0
    }
}

impl From<Vec<Observation>> for ObservationSeries {
    fn from(observations: Vec<Observation>) -> Self {
        Self(observations)
    }
}

impl FromIterator<Observation> for ObservationSeries {
    fn from_iter<I: IntoIterator<Item = Observation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ObservationSeries {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
