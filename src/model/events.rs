use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelMeta {
    pub name: String,
    /// Marker / stain description (`$PnS`), if the source recorded one.
    pub desc: Option<String>,
    /// Upper acquisition range (`$PnR`).
    pub range: Option<f64>,
}

impl ChannelMeta {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            desc: None,
            range: None,
        }
    }

    /// Marker name when present, channel name otherwise.
    pub fn display_name(&self) -> &str {
        match &self.desc {
            Some(d) if !d.trim().is_empty() => d.as_str(),
            _ => self.name.as_str(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("duplicate channel name: {0}")]
    DuplicateChannel(String),
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
    #[error("channel {channel} has {got} values, expected {expected}")]
    LengthMismatch {
        channel: String,
        got: usize,
        expected: usize,
    },
    #[error("row {row} has {got} values, expected {expected}")]
    RowWidth {
        row: usize,
        got: usize,
        expected: usize,
    },
    #[error("{channels} channel names for {columns} columns")]
    ColumnCount { channels: usize, columns: usize },
}

/// Column-major per-sample event store. Never mutated after construction;
/// every transformation returns a new table.
#[derive(Debug, Clone)]
pub struct EventTable {
    channels: Vec<ChannelMeta>,
    columns: Vec<Vec<f64>>,
    index: HashMap<String, usize>,
    keywords: BTreeMap<String, String>,
    n_events: usize,
}

impl EventTable {
    pub fn new(channels: Vec<ChannelMeta>, columns: Vec<Vec<f64>>) -> Result<Self, TableError> {
        if channels.len() != columns.len() {
            return Err(TableError::ColumnCount {
                channels: channels.len(),
                columns: columns.len(),
            });
        }
        let index = build_index(&channels)?;
        let n_events = columns.first().map(|c| c.len()).unwrap_or(0);
        for (meta, col) in channels.iter().zip(&columns) {
            if col.len() != n_events {
                return Err(TableError::LengthMismatch {
                    channel: meta.name.clone(),
                    got: col.len(),
                    expected: n_events,
                });
            }
        }
        Ok(Self {
            channels,
            columns,
            index,
            keywords: BTreeMap::new(),
            n_events,
        })
    }

    pub fn from_rows(names: &[&str], rows: &[Vec<f64>]) -> Result<Self, TableError> {
        let mut columns = vec![Vec::with_capacity(rows.len()); names.len()];
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != names.len() {
                return Err(TableError::RowWidth {
                    row: row_idx,
                    got: row.len(),
                    expected: names.len(),
                });
            }
            for (col, &v) in columns.iter_mut().zip(row) {
                col.push(v);
            }
        }
        let channels = names.iter().map(|n| ChannelMeta::named(n)).collect();
        Self::new(channels, columns)
    }

    pub fn with_keywords(mut self, keywords: BTreeMap<String, String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn n_events(&self) -> usize {
        self.n_events
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[ChannelMeta] {
        &self.channels
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn channel_set(&self) -> BTreeSet<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelMeta> {
        self.index.get(name).map(|&i| &self.channels[i])
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.index.get(name).map(|&i| self.columns[i].as_slice())
    }

    pub fn column_at(&self, idx: usize) -> &[f64] {
        &self.columns[idx]
    }

    pub fn value(&self, row: usize, channel: &str) -> Option<f64> {
        self.column(channel).and_then(|c| c.get(row).copied())
    }

    pub fn keyword(&self, key: &str) -> Option<&str> {
        self.keywords.get(key).map(|s| s.as_str())
    }

    pub fn keywords(&self) -> &BTreeMap<String, String> {
        &self.keywords
    }

    /// New table holding only `rows`, in the given order.
    pub fn subset(&self, rows: &[u32]) -> EventTable {
        let columns = self
            .columns
            .iter()
            .map(|col| rows.iter().map(|&r| col[r as usize]).collect())
            .collect();
        EventTable {
            channels: self.channels.clone(),
            columns,
            index: self.index.clone(),
            keywords: self.keywords.clone(),
            n_events: rows.len(),
        }
    }

    /// Applies an explicit old → new name mapping. Channels absent from the
    /// mapping keep their names; unknown keys are ignored.
    pub fn rename_channels(
        &self,
        mapping: &BTreeMap<String, String>,
    ) -> Result<EventTable, TableError> {
        let mut channels = self.channels.clone();
        for meta in &mut channels {
            if let Some(new_name) = mapping.get(&meta.name) {
                meta.name = new_name.clone();
            }
        }
        let index = build_index(&channels)?;
        Ok(EventTable {
            channels,
            columns: self.columns.clone(),
            index,
            keywords: self.keywords.clone(),
            n_events: self.n_events,
        })
    }

    /// New table with the listed columns replaced, keyed by channel name.
    pub fn with_columns(
        &self,
        replacements: Vec<(String, Vec<f64>)>,
    ) -> Result<EventTable, TableError> {
        let mut columns = self.columns.clone();
        for (name, values) in replacements {
            let idx = self
                .channel_index(&name)
                .ok_or_else(|| TableError::UnknownChannel(name.clone()))?;
            if values.len() != self.n_events {
                return Err(TableError::LengthMismatch {
                    channel: name,
                    got: values.len(),
                    expected: self.n_events,
                });
            }
            columns[idx] = values;
        }
        Ok(EventTable {
            channels: self.channels.clone(),
            columns,
            index: self.index.clone(),
            keywords: self.keywords.clone(),
            n_events: self.n_events,
        })
    }

    /// New table whose channels follow `order` exactly.
    pub fn reorder(&self, order: &[String]) -> Result<EventTable, TableError> {
        if order.len() != self.channels.len() {
            return Err(TableError::ColumnCount {
                channels: order.len(),
                columns: self.channels.len(),
            });
        }
        let mut channels = Vec::with_capacity(order.len());
        let mut columns = Vec::with_capacity(order.len());
        for name in order {
            let idx = self
                .channel_index(name)
                .ok_or_else(|| TableError::UnknownChannel(name.clone()))?;
            channels.push(self.channels[idx].clone());
            columns.push(self.columns[idx].clone());
        }
        let mut table = EventTable::new(channels, columns)?;
        table.keywords = self.keywords.clone();
        Ok(table)
    }

    pub fn all_rows(&self) -> Vec<u32> {
        (0..self.n_events as u32).collect()
    }
}

fn build_index(channels: &[ChannelMeta]) -> Result<HashMap<String, usize>, TableError> {
    let mut index = HashMap::with_capacity(channels.len());
    for (i, meta) in channels.iter().enumerate() {
        if index.insert(meta.name.clone(), i).is_some() {
            return Err(TableError::DuplicateChannel(meta.name.clone()));
        }
    }
    Ok(index)
}

/// Borrowed view over a subset of a table's rows. Gates and aggregators read
/// through this so populations never copy event data.
#[derive(Debug, Clone, Copy)]
pub struct EventView<'a> {
    table: &'a EventTable,
    rows: &'a [u32],
}

impl<'a> EventView<'a> {
    pub fn new(table: &'a EventTable, rows: &'a [u32]) -> Self {
        Self { table, rows }
    }

    pub fn table(&self) -> &'a EventTable {
        self.table
    }

    pub fn rows(&self) -> &'a [u32] {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.table.channel_index(channel).is_some()
    }

    pub fn column(&self, channel: &str) -> Option<Vec<f64>> {
        let col = self.table.column(channel)?;
        Some(self.rows.iter().map(|&r| col[r as usize]).collect())
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/events.rs"]
mod tests;
