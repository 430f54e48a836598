use crate::model::EventTable;
use crate::transform::TransformError;

const SPILLOVER_KEYS: &[&str] = &["$SPILLOVER", "SPILL", "SPILLOVER", "$COMP"];

/// Spillover matrix: row i is how much of fluorochrome i lands in each
/// detector, so `observed = true · S`.
#[derive(Debug, Clone, PartialEq)]
pub struct Spillover {
    pub channels: Vec<String>,
    pub matrix: Vec<Vec<f64>>,
}

impl Spillover {
    /// Parses the `n,name_1..name_n,v_11..v_nn` keyword form.
    pub fn parse(raw: &str) -> Result<Self, TransformError> {
        let fields: Vec<&str> = raw.split(',').map(|s| s.trim()).collect();
        let n = fields
            .first()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .ok_or_else(|| TransformError::Spillover("missing channel count".to_string()))?;
        if fields.len() != 1 + n + n * n {
            return Err(TransformError::Spillover(format!(
                "expected {} fields for {} channels, got {}",
                1 + n + n * n,
                n,
                fields.len()
            )));
        }
        let channels: Vec<String> = fields[1..=n].iter().map(|s| s.to_string()).collect();
        let mut matrix = vec![vec![0f64; n]; n];
        for (idx, raw_v) in fields[1 + n..].iter().enumerate() {
            matrix[idx / n][idx % n] = raw_v.parse::<f64>().map_err(|_| {
                TransformError::Spillover(format!("non-numeric spillover value {raw_v:?}"))
            })?;
        }
        Ok(Self { channels, matrix })
    }

    /// Spillover recorded in the table's keywords, if any.
    pub fn from_table(table: &EventTable) -> Option<Result<Self, TransformError>> {
        SPILLOVER_KEYS
            .iter()
            .find_map(|k| table.keyword(k))
            .map(Spillover::parse)
    }

    /// Returns a new table with the spillover channels compensated.
    pub fn compensate(&self, table: &EventTable) -> Result<EventTable, TransformError> {
        let inv = invert(&self.matrix)?;
        let n = self.channels.len();
        let mut cols = Vec::with_capacity(n);
        for name in &self.channels {
            let col = table
                .column(name)
                .ok_or_else(|| TransformError::UnknownChannel(name.clone()))?;
            cols.push(col);
        }

        let n_events = table.n_events();
        let mut out = vec![vec![0f64; n_events]; n];
        let mut observed = vec![0f64; n];
        for e in 0..n_events {
            for (o, col) in observed.iter_mut().zip(&cols) {
                *o = col[e];
            }
            for (j, out_col) in out.iter_mut().enumerate() {
                let mut v = 0f64;
                for (i, o) in observed.iter().enumerate() {
                    v += o * inv[i][j];
                }
                out_col[e] = v;
            }
        }

        let replacements = self.channels.iter().cloned().zip(out).collect();
        Ok(table.with_columns(replacements)?)
    }
}

/// Gauss-Jordan inversion with partial pivoting.
pub fn invert(matrix: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, TransformError> {
    let n = matrix.len();
    let mut a: Vec<Vec<f64>> = matrix.to_vec();
    let mut inv: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&x, &y| {
                a[x][col]
                    .abs()
                    .partial_cmp(&a[y][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(TransformError::SingularSpillover);
        }
        a.swap(col, pivot);
        inv.swap(col, pivot);

        let p = a[col][col];
        for j in 0..n {
            a[col][j] /= p;
            inv[col][j] /= p;
        }
        let pivot_a = a[col].clone();
        let pivot_inv = inv[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[row][j] -= factor * pivot_a[j];
                inv[row][j] -= factor * pivot_inv[j];
            }
        }
    }
    Ok(inv)
}

#[cfg(test)]
#[path = "../../tests/src_inline/transform/compensation.rs"]
mod tests;
