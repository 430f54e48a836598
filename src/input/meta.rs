use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;

use crate::input::InputError;
use crate::input::delimited::{open_maybe_gz, read_text_line};
use crate::model::SampleMeta;

/// Outcome of pulling a metadata field out of a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaField {
    Found(String),
    /// The pattern matched but captured nothing.
    Empty,
    NotFound,
}

impl MetaField {
    pub fn value(&self) -> Option<&str> {
        match self {
            MetaField::Found(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// Uses capture group 1 when the pattern has one, the whole match otherwise.
pub fn extract_field(text: &str, pattern: &Regex) -> MetaField {
    let Some(caps) = pattern.captures(text) else {
        return MetaField::NotFound;
    };
    let m = if pattern.captures_len() > 1 {
        caps.get(1)
    } else {
        caps.get(0)
    };
    match m {
        Some(m) if !m.as_str().is_empty() => MetaField::Found(m.as_str().to_string()),
        _ => MetaField::Empty,
    }
}

/// File name without directory and without `.fcs`, `.tsv`, `.csv`, `.gz`,
/// matched regardless of case.
pub fn sample_id_from_path(path: &Path) -> String {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    for suffix in [".gz", ".fcs", ".tsv", ".csv"] {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(suffix) {
            name.truncate(name.len() - suffix.len());
        }
    }
    name
}

/// Reads a tab-separated sample annotation table. The key column is the
/// first of `sample`, `file`, `name` (case-insensitive), else column 0.
/// Keys may be sample ids or file names; both resolve to the sample id.
pub fn load_sample_meta(path: &Path) -> Result<BTreeMap<String, SampleMeta>, InputError> {
    let mut reader = open_maybe_gz(path)?;
    let mut buf = String::new();

    let read = read_text_line(&mut reader, &mut buf)?;
    if read == 0 {
        return Err(InputError::Format("meta file is empty".to_string()));
    }
    let header_cols: Vec<String> = buf
        .trim_end()
        .split('\t')
        .map(|s| s.trim().to_string())
        .collect();
    if header_cols.iter().all(|c| c.is_empty()) {
        return Err(InputError::Format("meta file header is empty".to_string()));
    }

    let mut key_col = 0usize;
    for (idx, name) in header_cols.iter().enumerate() {
        let lower = name.to_ascii_lowercase();
        if lower == "sample" || lower == "file" || lower == "name" {
            key_col = idx;
            break;
        }
    }

    let mut out: BTreeMap<String, SampleMeta> = BTreeMap::new();
    let mut line_no = 1usize;
    loop {
        buf.clear();
        let read = read_text_line(&mut reader, &mut buf)?;
        if read == 0 {
            break;
        }
        line_no += 1;
        let line = buf.trim_end();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let Some(raw_key) = fields.get(key_col).map(|s| s.trim()) else {
            tracing::warn!(line = line_no, "meta line has no key column; skipping");
            continue;
        };
        if raw_key.is_empty() {
            tracing::warn!(line = line_no, "meta line has empty sample key; skipping");
            continue;
        }
        let key = sample_id_from_path(Path::new(raw_key));
        if out.contains_key(&key) {
            tracing::warn!(
                line = line_no,
                sample = %key,
                "duplicate sample in metadata; keeping first"
            );
            continue;
        }
        let mut row = SampleMeta::new();
        for (idx, name) in header_cols.iter().enumerate() {
            if idx == key_col || name.is_empty() {
                continue;
            }
            let value = fields.get(idx).map(|s| s.trim()).unwrap_or("");
            row.insert(name.clone(), value.to_string());
        }
        out.insert(key, row);
    }

    Ok(out)
}
