use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use thiserror::Error;

use crate::model::{EventTable, EventView};
use crate::numeric::{mean, quantile};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AggregateError {
    #[error("population is empty")]
    EmptyPopulation,
    #[error("channel not present: {0}")]
    MissingChannel(String),
    #[error("{0}")]
    Other(String),
}

/// Maps a population's events to channel-keyed values. Implementations
/// outside this crate plug into `stats` unchanged.
pub trait Aggregator: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Keys this aggregator reports for `table`; used to fill NaN values
    /// when `aggregate` fails.
    fn keys(&self, table: &EventTable) -> Vec<String>;

    fn aggregate(&self, view: &EventView<'_>) -> Result<BTreeMap<String, f64>, AggregateError>;
}

fn selected_channels(channels: &Option<Vec<String>>, table: &EventTable) -> Vec<String> {
    match channels {
        Some(list) => list.clone(),
        None => table.channel_names().into_iter().map(String::from).collect(),
    }
}

fn per_channel<F>(
    channels: &Option<Vec<String>>,
    view: &EventView<'_>,
    allow_empty: bool,
    f: F,
) -> Result<BTreeMap<String, f64>, AggregateError>
where
    F: Fn(&[f64]) -> f64,
{
    if view.is_empty() && !allow_empty {
        return Err(AggregateError::EmptyPopulation);
    }
    let mut out = BTreeMap::new();
    for ch in selected_channels(channels, view.table()) {
        let values = view
            .column(&ch)
            .ok_or_else(|| AggregateError::MissingChannel(ch.clone()))?;
        out.insert(ch, f(&values));
    }
    Ok(out)
}

/// Arithmetic mean per channel; `None` means every channel.
#[derive(Debug, Clone, Default)]
pub struct Mean {
    pub channels: Option<Vec<String>>,
}

impl Aggregator for Mean {
    fn name(&self) -> &str {
        "mean"
    }

    fn keys(&self, table: &EventTable) -> Vec<String> {
        selected_channels(&self.channels, table)
    }

    fn aggregate(&self, view: &EventView<'_>) -> Result<BTreeMap<String, f64>, AggregateError> {
        per_channel(&self.channels, view, false, mean)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Median {
    pub channels: Option<Vec<String>>,
}

impl Aggregator for Median {
    fn name(&self) -> &str {
        "median"
    }

    fn keys(&self, table: &EventTable) -> Vec<String> {
        selected_channels(&self.channels, table)
    }

    fn aggregate(&self, view: &EventView<'_>) -> Result<BTreeMap<String, f64>, AggregateError> {
        per_channel(&self.channels, view, false, |v| quantile(v, 0.5))
    }
}

#[derive(Debug, Clone)]
pub struct Quantile {
    pub p: f64,
    pub channels: Option<Vec<String>>,
    name: String,
}

impl Quantile {
    pub fn new(p: f64, channels: Option<Vec<String>>) -> Self {
        Self {
            p,
            channels,
            name: format!("p{}", (p * 100.0).round()),
        }
    }
}

impl Aggregator for Quantile {
    fn name(&self) -> &str {
        &self.name
    }

    fn keys(&self, table: &EventTable) -> Vec<String> {
        selected_channels(&self.channels, table)
    }

    fn aggregate(&self, view: &EventView<'_>) -> Result<BTreeMap<String, f64>, AggregateError> {
        if !(0.0..=1.0).contains(&self.p) {
            return Err(AggregateError::Other(format!(
                "quantile {} outside [0, 1]",
                self.p
            )));
        }
        per_channel(&self.channels, view, false, |v| quantile(v, self.p))
    }
}

/// Number of finite values per channel. Never fails on an empty population.
#[derive(Debug, Clone, Default)]
pub struct Count {
    pub channels: Option<Vec<String>>,
}

impl Aggregator for Count {
    fn name(&self) -> &str {
        "count"
    }

    fn keys(&self, table: &EventTable) -> Vec<String> {
        selected_channels(&self.channels, table)
    }

    fn aggregate(&self, view: &EventView<'_>) -> Result<BTreeMap<String, f64>, AggregateError> {
        per_channel(&self.channels, view, true, |v| {
            v.iter().filter(|x| x.is_finite()).count() as f64
        })
    }
}

/// Built-in aggregator by CLI name: `mean`, `median`, `count`, or `pNN`
/// for the NN-th percentile.
pub fn by_name(name: &str, channels: Option<Vec<String>>) -> Option<Arc<dyn Aggregator>> {
    let name = name.trim().to_ascii_lowercase();
    match name.as_str() {
        "mean" => Some(Arc::new(Mean { channels })),
        "median" => Some(Arc::new(Median { channels })),
        "count" => Some(Arc::new(Count { channels })),
        _ => {
            let pct: f64 = name.strip_prefix('p')?.parse().ok()?;
            if !(0.0..=100.0).contains(&pct) {
                return None;
            }
            Some(Arc::new(Quantile::new(pct / 100.0, channels)))
        }
    }
}
