use crate::gating::{GateFitError, GateFitter, Region, expect_channels};
use crate::model::EventView;
use crate::numeric::{mad, median};

/// Singlet discrimination on an area/height channel pair. Doublets carry
/// more area per unit height, so events whose ratio sits more than
/// `width` robust deviations from the sample median are dropped.
#[derive(Debug, Clone)]
pub struct SingletFitter {
    pub width: f64,
}

impl Default for SingletFitter {
    fn default() -> Self {
        Self { width: 4.0 }
    }
}

impl GateFitter for SingletFitter {
    fn method(&self) -> &str {
        "singlet"
    }

    fn args(&self) -> String {
        format!("width={}", self.width)
    }

    /// `channels` is `[area, height]`.
    fn fit(&self, view: &EventView<'_>, channels: &[String]) -> Result<Region, GateFitError> {
        expect_channels(self.method(), channels, 2)?;
        let area = view.column(&channels[0]).unwrap_or_default();
        let height = view.column(&channels[1]).unwrap_or_default();

        let ratios: Vec<f64> = area
            .iter()
            .zip(&height)
            .filter(|&(a, h)| a.is_finite() && h.is_finite() && *h > 0.0)
            .map(|(a, h)| a / h)
            .collect();
        if ratios.is_empty() {
            return Err(GateFitError::EmptyInput {
                method: self.method().to_string(),
            });
        }

        let center = median(&ratios);
        let spread = mad(&ratios);
        if !(spread > 0.0) {
            return Err(GateFitError::Degenerate {
                method: self.method().to_string(),
                reason: "area/height ratio has zero spread".to_string(),
            });
        }
        Ok(Region::Ratio {
            numerator: channels[0].clone(),
            denominator: channels[1].clone(),
            min: center - self.width * spread,
            max: center + self.width * spread,
        })
    }
}
