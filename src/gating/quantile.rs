use serde::{Deserialize, Serialize};

use crate::gating::{Bound, GateFitError, GateFitter, Region, expect_channels, finite_column};
use crate::model::EventView;
use crate::numeric::{finite_sorted, quantile_sorted};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    #[default]
    Above,
    Below,
}

impl Side {
    pub fn bound(self, channel: &str, threshold: f64) -> Bound {
        match self {
            Side::Above => Bound::new(channel, Some(threshold), None),
            Side::Below => Bound::new(channel, None, Some(threshold)),
        }
    }
}

/// Threshold at the `q`-quantile of the parent's values on one channel.
#[derive(Debug, Clone)]
pub struct QuantileFitter {
    pub q: f64,
    pub side: Side,
}

impl GateFitter for QuantileFitter {
    fn method(&self) -> &str {
        "quantile"
    }

    fn args(&self) -> String {
        format!("q={};side={:?}", self.q, self.side)
    }

    fn fit(&self, view: &EventView<'_>, channels: &[String]) -> Result<Region, GateFitError> {
        expect_channels(self.method(), channels, 1)?;
        if !(0.0..=1.0).contains(&self.q) {
            return Err(GateFitError::Degenerate {
                method: self.method().to_string(),
                reason: format!("quantile {} outside [0, 1]", self.q),
            });
        }
        let sorted = finite_sorted(&finite_column(view, &channels[0]));
        if sorted.is_empty() {
            return Err(GateFitError::EmptyInput {
                method: self.method().to_string(),
            });
        }
        let threshold = quantile_sorted(&sorted, self.q);
        Ok(Region::Rectangle {
            bounds: vec![self.side.bound(&channels[0], threshold)],
        })
    }
}
