use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::input::InputError;
use crate::model::EventTable;

pub fn open_maybe_gz(path: &Path) -> Result<Box<dyn BufRead>, InputError> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz")) {
        let dec = flate2::read::GzDecoder::new(file);
        Ok(Box::new(BufReader::with_capacity(128 * 1024, dec)))
    } else {
        Ok(Box::new(BufReader::with_capacity(128 * 1024, file)))
    }
}

/// `read_line` that reports a cut-off gzip stream or non-UTF-8 bytes as a
/// format error rather than an IO failure.
pub(crate) fn read_text_line<R: BufRead>(
    reader: &mut R,
    buf: &mut String,
) -> Result<usize, InputError> {
    reader.read_line(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
            InputError::Format(format!("corrupt or truncated text input: {e}"))
        }
        _ => InputError::Io(e),
    })
}

/// Reads a header + numeric rows table (TSV or CSV, optionally gzip).
pub fn read_delimited(path: &Path) -> Result<EventTable, InputError> {
    let reader = open_maybe_gz(path)?;
    parse_delimited(reader)
}

pub fn parse_delimited<R: BufRead>(mut reader: R) -> Result<EventTable, InputError> {
    let mut buf = String::new();

    let read = read_text_line(&mut reader, &mut buf)?;
    if read == 0 {
        return Err(InputError::Format("event table is empty".to_string()));
    }
    let header_line = buf.trim_end().to_string();
    let delim = detect_delimiter(&header_line);
    let names: Vec<String> = header_line
        .split(delim)
        .map(|s| s.trim().trim_matches('"').to_string())
        .collect();
    if names.iter().any(|n| n.is_empty()) {
        return Err(InputError::Format(
            "event table header has an empty channel name".to_string(),
        ));
    }

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
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
        let fields: Vec<&str> = line.split(delim).collect();
        if fields.len() != names.len() {
            return Err(InputError::Format(format!(
                "line {} has {} fields, header has {}",
                line_no,
                fields.len(),
                names.len()
            )));
        }
        for (col, field) in columns.iter_mut().zip(&fields) {
            let v = field.trim().parse::<f64>().map_err(|_| {
                InputError::Format(format!("line {}: non-numeric value {:?}", line_no, field))
            })?;
            col.push(v);
        }
    }

    let channels = names
        .iter()
        .map(|n| crate::model::ChannelMeta::named(n))
        .collect();
    EventTable::new(channels, columns).map_err(|e| InputError::Format(e.to_string()))
}

fn detect_delimiter(header: &str) -> char {
    if header.contains('\t') {
        '\t'
    } else if header.contains(',') {
        ','
    } else {
        '\t'
    }
}
