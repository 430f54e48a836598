/// Boolean membership over a parent population's retained events.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mask {
    bits: Vec<bool>,
    count: usize,
}

impl Mask {
    pub fn from_bools(bits: Vec<bool>) -> Self {
        let count = bits.iter().filter(|&&b| b).count();
        Self { bits, count }
    }

    pub fn all(len: usize) -> Self {
        Self {
            bits: vec![true; len],
            count: len,
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Number of retained events.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn get(&self, i: usize) -> bool {
        self.bits.get(i).copied().unwrap_or(false)
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    /// Maps the mask back onto the parent's row indices.
    pub fn select(&self, parent_rows: &[u32]) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.count);
        for (&row, &keep) in parent_rows.iter().zip(&self.bits) {
            if keep {
                out.push(row);
            }
        }
        out
    }
}
