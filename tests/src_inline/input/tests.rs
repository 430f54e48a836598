use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::delimited::parse_delimited;
use super::meta::{MetaField, extract_field, load_sample_meta, sample_id_from_path};
use super::*;

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("kira_cytogate_input_{}_{}", std::process::id(), id));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_file(path: &Path, contents: &str) {
    let mut f = BufWriter::new(File::create(path).unwrap());
    f.write_all(contents.as_bytes()).unwrap();
}

fn write_gz(path: &Path, contents: &str) {
    let f = File::create(path).unwrap();
    let mut enc = flate2::write::GzEncoder::new(f, flate2::Compression::default());
    enc.write_all(contents.as_bytes()).unwrap();
    enc.finish().unwrap();
}

#[test]
fn test_parse_tsv_and_csv() {
    let tsv = parse_delimited("FSC.A\tSSC.A\n1\t2\n3\t4\n".as_bytes()).unwrap();
    assert_eq!(tsv.n_events(), 2);
    assert_eq!(tsv.column("SSC.A").unwrap(), &[2.0, 4.0]);

    let csv = parse_delimited("\"FSC.A\",\"SSC.A\"\n1.5,2\n".as_bytes()).unwrap();
    assert_eq!(csv.channel_names(), vec!["FSC.A", "SSC.A"]);
    assert_eq!(csv.column("FSC.A").unwrap(), &[1.5]);
}

#[test]
fn test_delimited_errors() {
    assert!(matches!(
        parse_delimited("".as_bytes()),
        Err(InputError::Format(_))
    ));
    assert!(matches!(
        parse_delimited("A\tB\n1\n".as_bytes()),
        Err(InputError::Format(ref m)) if m.contains("line 2")
    ));
    assert!(matches!(
        parse_delimited("A\tB\n1\tx\n".as_bytes()),
        Err(InputError::Format(ref m)) if m.contains("non-numeric")
    ));
}

#[test]
fn test_read_gz_table() {
    let dir = make_temp_dir();
    let path = dir.join("s1.tsv.gz");
    write_gz(&path, "FSC.A\tSSC.A\n10\t20\n");
    let table = read_sample(&path).unwrap();
    assert_eq!(table.n_events(), 1);
    assert_eq!(table.value(0, "SSC.A"), Some(20.0));
}

#[test]
fn test_truncated_gz_table_is_format_error() {
    let mut body = String::from("FSC.A\tSSC.A\n");
    for i in 0..5000 {
        body.push_str(&format!("{}\t{}\n", i, i * 7 % 1013));
    }
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(body.as_bytes()).unwrap();
    let bytes = enc.finish().unwrap();

    let dir = make_temp_dir();
    let path = dir.join("cut.tsv.gz");
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
    let err = read_sample(&path).unwrap_err();
    assert!(matches!(err, InputError::Format(_)), "{err:?}");
    assert_eq!(err.exclusion_kind(), crate::model::ExclusionKind::Format);
}

#[test]
fn test_non_utf8_table_is_format_error() {
    let dir = make_temp_dir();
    let path = dir.join("bad.tsv");
    fs::write(&path, b"FSC.A\tSSC.A\n\xff\xfe\t1\n").unwrap();
    assert!(matches!(read_sample(&path), Err(InputError::Format(_))));

    let meta = dir.join("meta.tsv");
    fs::write(&meta, b"sample\tdonor\nA01\t\xff\n").unwrap();
    assert!(matches!(load_sample_meta(&meta), Err(InputError::Format(_))));
}

#[test]
fn test_extract_field_distinguishes_empty() {
    let re = regex::Regex::new(r"_([A-H][0-9]{2})?\.fcs$").unwrap();
    assert_eq!(
        extract_field("Specimen_001_B07.fcs", &re),
        MetaField::Found("B07".to_string())
    );
    assert_eq!(extract_field("Specimen_001_.fcs", &re), MetaField::Empty);
    assert_eq!(extract_field("Specimen.tsv", &re), MetaField::NotFound);
    assert_eq!(MetaField::NotFound.value(), None);
}

#[test]
fn test_sample_id_from_path() {
    assert_eq!(sample_id_from_path(Path::new("/x/y/A01.fcs")), "A01");
    assert_eq!(sample_id_from_path(Path::new("s2.tsv.gz")), "s2");
    assert_eq!(sample_id_from_path(Path::new("A01.TSV")), "A01");
    assert_eq!(sample_id_from_path(Path::new("B02.Csv.GZ")), "B02");
    assert_eq!(sample_id_from_path(Path::new("C03.FCS")), "C03");
}

#[test]
fn test_load_sample_set_partial_failure() {
    let dir = make_temp_dir();
    write_file(&dir.join("plate_A01.tsv"), "FSC.A\tSSC.A\n1\t2\n3\t4\n");
    write_file(&dir.join("plate_B02.tsv"), "FSC.A\tSSC.A\n5\t6\n");
    write_file(&dir.join("plate_C03.fcs"), "not an fcs file");
    write_file(&dir.join("notes.txt"), "ignored");

    let options = LoadOptions {
        name_patterns: vec![(
            "well".to_string(),
            regex::Regex::new(r"_([A-H][0-9]{2})\.").unwrap(),
        )],
        sample_meta: Default::default(),
    };
    let set = load_sample_set(&dir, &options).unwrap();
    assert_eq!(set.ids(), vec!["plate_A01", "plate_B02"]);
    assert_eq!(set.meta_value("plate_A01", "well"), Some("A01"));
    assert_eq!(set.excluded().len(), 1);
    assert_eq!(set.excluded()[0].id, "plate_C03");
    assert_eq!(set.excluded()[0].kind, crate::model::ExclusionKind::Format);
}

#[test]
fn test_empty_directory_is_missing_input() {
    let dir = make_temp_dir();
    assert!(matches!(
        load_sample_set(&dir, &LoadOptions::default()),
        Err(InputError::MissingInput(_))
    ));
}

#[test]
fn test_load_sample_meta_first_wins() {
    let dir = make_temp_dir();
    let path = dir.join("meta.tsv");
    write_file(
        &path,
        "condition\tsample\tdonor\nstim\tA01.fcs\td1\nctrl\tA01\td2\nctrl\tB01\t\n",
    );
    let meta = load_sample_meta(&path).unwrap();
    assert_eq!(meta.len(), 2);
    assert_eq!(meta["A01"]["condition"], "stim");
    assert_eq!(meta["A01"]["donor"], "d1");
    assert_eq!(meta["B01"]["donor"], "");
}
