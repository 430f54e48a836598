use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::input::InputError;
use crate::model::{ChannelMeta, EventTable};

const HEADER_BYTES: usize = 58;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FcsHeader {
    pub version: String,
    pub text_start: usize,
    pub text_end: usize,
    pub data_start: usize,
    pub data_end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataType {
    Int,
    Float,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

#[derive(Debug, Clone)]
struct ParamLayout {
    bytes: usize,
    mask: Option<u64>,
}

pub fn read_fcs(path: &Path) -> Result<EventTable, InputError> {
    let file = File::open(path)?;
    // SAFETY: the mapping is read-only and dropped before this function returns.
    let mmap = unsafe { Mmap::map(&file)? };
    parse_fcs(&mmap[..])
}

pub fn parse_fcs(bytes: &[u8]) -> Result<EventTable, InputError> {
    let header = parse_header(bytes)?;
    if header.text_end >= bytes.len() || header.text_start > header.text_end {
        return Err(InputError::Format(format!(
            "TEXT segment {}..{} outside file of {} bytes",
            header.text_start,
            header.text_end,
            bytes.len()
        )));
    }
    let keywords = parse_text_segment(&bytes[header.text_start..=header.text_end])?;

    let (data_start, data_end) = resolve_data_offsets(&header, &keywords)?;

    let n_par = required_usize(&keywords, "$PAR")?;
    let n_tot = required_usize(&keywords, "$TOT")?;
    if n_par == 0 {
        return Err(InputError::Format("$PAR is zero".to_string()));
    }
    if let Some(mode) = keywords.get("$MODE") {
        if !mode.eq_ignore_ascii_case("L") {
            return Err(InputError::Format(format!(
                "unsupported $MODE {mode} (only list mode is read)"
            )));
        }
    }

    let data_type = match keywords.get("$DATATYPE").map(|s| s.to_ascii_uppercase()) {
        Some(t) if t == "I" => DataType::Int,
        Some(t) if t == "F" => DataType::Float,
        Some(t) if t == "D" => DataType::Double,
        Some(t) => return Err(InputError::Format(format!("unsupported $DATATYPE {t}"))),
        None => return Err(InputError::Format("missing $DATATYPE".to_string())),
    };
    let byte_order = parse_byte_order(keywords.get("$BYTEORD").map(|s| s.as_str()))?;

    let mut channels = Vec::with_capacity(n_par);
    let mut layout = Vec::with_capacity(n_par);
    for p in 1..=n_par {
        let name = keywords
            .get(&format!("$P{p}N"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| InputError::Format(format!("missing $P{p}N")))?;
        let desc = keywords
            .get(&format!("$P{p}S"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let range = keywords
            .get(&format!("$P{p}R"))
            .and_then(|s| s.trim().parse::<f64>().ok());
        let bits = keywords
            .get(&format!("$P{p}B"))
            .and_then(|s| s.trim().parse::<usize>().ok());
        layout.push(param_layout(p, data_type, bits, range)?);
        channels.push(ChannelMeta { name, desc, range });
    }

    let row_bytes: usize = layout.iter().map(|l| l.bytes).sum();
    let expected = n_tot
        .checked_mul(row_bytes)
        .ok_or_else(|| InputError::Format("event count overflows data size".to_string()))?;
    let available = if data_end >= data_start && data_start < bytes.len() {
        (data_end.min(bytes.len() - 1) - data_start) + 1
    } else {
        0
    };
    if n_tot > 0 && (data_end >= bytes.len() || available < expected) {
        return Err(InputError::Format(format!(
            "truncated DATA segment: expected {} bytes for {} events, found {}",
            expected, n_tot, available
        )));
    }

    let mut columns = vec![Vec::with_capacity(n_tot); n_par];
    let mut offset = data_start;
    for _ in 0..n_tot {
        for (col, l) in columns.iter_mut().zip(&layout) {
            let raw = &bytes[offset..offset + l.bytes];
            col.push(decode_value(raw, data_type, byte_order, l.mask));
            offset += l.bytes;
        }
    }

    tracing::debug!(
        version = %header.version,
        events = n_tot,
        channels = n_par,
        "parsed FCS data segment"
    );

    let table = EventTable::new(channels, columns)
        .map_err(|e| InputError::Format(e.to_string()))?;
    Ok(table.with_keywords(keywords))
}

pub fn parse_header(bytes: &[u8]) -> Result<FcsHeader, InputError> {
    if bytes.len() < HEADER_BYTES {
        return Err(InputError::Format(format!(
            "file too small for FCS header ({} bytes)",
            bytes.len()
        )));
    }
    let version = std::str::from_utf8(&bytes[0..6])
        .map_err(|_| InputError::Format("non-ASCII FCS version".to_string()))?
        .to_string();
    if !version.starts_with("FCS") {
        return Err(InputError::Format(format!("bad FCS magic {version:?}")));
    }
    Ok(FcsHeader {
        version,
        text_start: parse_offset(&bytes[10..18], "text start")?,
        text_end: parse_offset(&bytes[18..26], "text end")?,
        data_start: parse_offset(&bytes[26..34], "data start")?,
        data_end: parse_offset(&bytes[34..42], "data end")?,
    })
}

fn parse_offset(field: &[u8], what: &str) -> Result<usize, InputError> {
    let s = std::str::from_utf8(field)
        .map_err(|_| InputError::Format(format!("non-ASCII {what} offset")))?
        .trim();
    if s.is_empty() {
        return Ok(0);
    }
    s.parse::<usize>()
        .map_err(|_| InputError::Format(format!("invalid {what} offset {s:?}")))
}

/// Splits a TEXT segment into keyword/value pairs. The first byte is the
/// delimiter; a doubled delimiter is a literal delimiter inside a token.
/// Keywords are upper-cased.
pub fn parse_text_segment(segment: &[u8]) -> Result<BTreeMap<String, String>, InputError> {
    let Some(&delim) = segment.first() else {
        return Err(InputError::Format("empty TEXT segment".to_string()));
    };
    let mut tokens: Vec<Vec<u8>> = Vec::new();
    let mut current = Vec::new();
    let mut i = 1usize;
    while i < segment.len() {
        let b = segment[i];
        if b == delim {
            if segment.get(i + 1) == Some(&delim) {
                current.push(delim);
                i += 2;
                continue;
            }
            tokens.push(std::mem::take(&mut current));
            i += 1;
            continue;
        }
        current.push(b);
        i += 1;
    }
    if !current.is_empty() && current.iter().any(|c| !c.is_ascii_whitespace() && *c != 0) {
        tokens.push(current);
    }
    if tokens.len() % 2 != 0 {
        return Err(InputError::Format(format!(
            "TEXT segment has an unpaired keyword ({} tokens)",
            tokens.len()
        )));
    }

    let mut out = BTreeMap::new();
    for pair in tokens.chunks(2) {
        let key = String::from_utf8_lossy(&pair[0]).trim().to_ascii_uppercase();
        let value = String::from_utf8_lossy(&pair[1]).trim().to_string();
        if key.is_empty() {
            continue;
        }
        out.entry(key).or_insert(value);
    }
    Ok(out)
}

fn resolve_data_offsets(
    header: &FcsHeader,
    keywords: &BTreeMap<String, String>,
) -> Result<(usize, usize), InputError> {
    if header.data_start != 0 || header.data_end != 0 {
        return Ok((header.data_start, header.data_end));
    }
    // Large FCS 3.x files record offsets only in TEXT.
    let start = required_usize(keywords, "$BEGINDATA")?;
    let end = required_usize(keywords, "$ENDDATA")?;
    Ok((start, end))
}

fn required_usize(keywords: &BTreeMap<String, String>, key: &str) -> Result<usize, InputError> {
    let raw = keywords
        .get(key)
        .ok_or_else(|| InputError::Format(format!("missing {key}")))?;
    raw.trim()
        .parse::<usize>()
        .map_err(|_| InputError::Format(format!("invalid {key} value {raw:?}")))
}

fn parse_byte_order(raw: Option<&str>) -> Result<ByteOrder, InputError> {
    match raw.map(|s| s.replace(' ', "")) {
        Some(s) if matches!(s.as_str(), "1,2,3,4" | "1,2" | "1,2,3,4,5,6,7,8") => {
            Ok(ByteOrder::Little)
        }
        Some(s) if matches!(s.as_str(), "4,3,2,1" | "2,1" | "8,7,6,5,4,3,2,1") => {
            Ok(ByteOrder::Big)
        }
        Some(s) => Err(InputError::Format(format!("unsupported $BYTEORD {s}"))),
        None => Err(InputError::Format("missing $BYTEORD".to_string())),
    }
}

fn param_layout(
    p: usize,
    data_type: DataType,
    bits: Option<usize>,
    range: Option<f64>,
) -> Result<ParamLayout, InputError> {
    match data_type {
        DataType::Float => Ok(ParamLayout {
            bytes: 4,
            mask: None,
        }),
        DataType::Double => Ok(ParamLayout {
            bytes: 8,
            mask: None,
        }),
        DataType::Int => {
            let bits = bits.ok_or_else(|| InputError::Format(format!("missing $P{p}B")))?;
            if !matches!(bits, 8 | 16 | 32 | 64) {
                return Err(InputError::Format(format!(
                    "unsupported integer width {bits} for parameter {p}"
                )));
            }
            // Bits above a power-of-two range are not part of the value.
            let mask = range.and_then(|r| {
                let r = r as u64;
                (r > 0 && r.is_power_of_two() && r.trailing_zeros() < bits as u32).then(|| r - 1)
            });
            Ok(ParamLayout {
                bytes: bits / 8,
                mask,
            })
        }
    }
}

fn decode_value(raw: &[u8], data_type: DataType, order: ByteOrder, mask: Option<u64>) -> f64 {
    let mut buf = [0u8; 8];
    let n = raw.len();
    match order {
        ByteOrder::Little => buf[..n].copy_from_slice(raw),
        ByteOrder::Big => {
            for (i, b) in raw.iter().rev().enumerate() {
                buf[i] = *b;
            }
        }
    }
    match data_type {
        DataType::Float => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
        DataType::Double => f64::from_le_bytes(buf),
        DataType::Int => {
            let v = u64::from_le_bytes(buf);
            match mask {
                Some(m) => (v & m) as f64,
                None => v as f64,
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/fcs.rs"]
mod tests;
