use super::*;

fn build_fcs(keywords: &[(&str, String)], data: &[u8]) -> Vec<u8> {
    let mut text = String::from("|");
    for (k, v) in keywords {
        text.push_str(k);
        text.push('|');
        text.push_str(v);
        text.push('|');
    }
    let text_start = 58usize;
    let text_end = text_start + text.len() - 1;
    let data_start = text_end + 1;
    let data_end = data_start + data.len() - 1;

    let mut out = Vec::new();
    out.extend_from_slice(b"FCS3.1    ");
    for v in [text_start, text_end, data_start, data_end, 0, 0] {
        out.extend_from_slice(format!("{:>8}", v).as_bytes());
    }
    assert_eq!(out.len(), 58);
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(data);
    out
}

fn float_keywords(n_events: usize) -> Vec<(&'static str, String)> {
    vec![
        ("$BYTEORD", "1,2,3,4".to_string()),
        ("$DATATYPE", "F".to_string()),
        ("$MODE", "L".to_string()),
        ("$PAR", "2".to_string()),
        ("$TOT", n_events.to_string()),
        ("$P1N", "FSC-A".to_string()),
        ("$P1B", "32".to_string()),
        ("$P1R", "262144".to_string()),
        ("$P2N", "FL1-A".to_string()),
        ("$P2S", "CD3".to_string()),
        ("$P2B", "32".to_string()),
        ("$P2R", "262144".to_string()),
        ("SPILL", "2,FSC-A,FL1-A,1,0,0,1".to_string()),
    ]
}

fn float_data(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

#[test]
fn test_parse_float_fcs() {
    let bytes = build_fcs(&float_keywords(3), &float_data(&[1.0, 2.0, 3.5, 4.0, 5.0, 6.25]));
    let table = parse_fcs(&bytes).unwrap();
    assert_eq!(table.n_events(), 3);
    assert_eq!(table.channel_names(), vec!["FSC-A", "FL1-A"]);
    assert_eq!(table.column("FSC-A").unwrap(), &[1.0, 3.5, 5.0]);
    assert_eq!(table.column("FL1-A").unwrap(), &[2.0, 4.0, 6.25]);
    let fl1 = table.channel("FL1-A").unwrap();
    assert_eq!(fl1.desc.as_deref(), Some("CD3"));
    assert_eq!(fl1.range, Some(262144.0));
    assert_eq!(table.keyword("SPILL"), Some("2,FSC-A,FL1-A,1,0,0,1"));
}

#[test]
fn test_truncated_data_rejected() {
    let mut bytes = build_fcs(&float_keywords(3), &float_data(&[1.0, 2.0, 3.5, 4.0, 5.0, 6.25]));
    bytes.truncate(bytes.len() - 4);
    let err = parse_fcs(&bytes).unwrap_err();
    assert!(matches!(err, InputError::Format(ref m) if m.contains("truncated")));
}

#[test]
fn test_declared_events_exceed_data() {
    let bytes = build_fcs(&float_keywords(4), &float_data(&[1.0, 2.0, 3.5, 4.0, 5.0, 6.25]));
    assert!(matches!(parse_fcs(&bytes), Err(InputError::Format(_))));
}

#[test]
fn test_bad_magic_rejected() {
    let mut bytes = build_fcs(&float_keywords(1), &float_data(&[1.0, 2.0]));
    bytes[0] = b'X';
    assert!(matches!(parse_fcs(&bytes), Err(InputError::Format(_))));
    assert!(matches!(parse_fcs(b"FCS3.0"), Err(InputError::Format(_))));
}

#[test]
fn test_int_big_endian_with_range_mask() {
    let kw = vec![
        ("$BYTEORD", "4,3,2,1".to_string()),
        ("$DATATYPE", "I".to_string()),
        ("$PAR", "1".to_string()),
        ("$TOT", "2".to_string()),
        ("$P1N", "FSC-H".to_string()),
        ("$P1B", "16".to_string()),
        ("$P1R", "1024".to_string()),
    ];
    // 0x0405 masked to 10 bits is 0x0005; 0x0300 fits.
    let data = [0x04u8, 0x05, 0x03, 0x00];
    let table = parse_fcs(&build_fcs(&kw, &data)).unwrap();
    assert_eq!(table.column("FSC-H").unwrap(), &[5.0, 768.0]);
}

#[test]
fn test_double_with_eight_byte_order() {
    let kw = vec![
        ("$BYTEORD", "8,7,6,5,4,3,2,1".to_string()),
        ("$DATATYPE", "D".to_string()),
        ("$PAR", "1".to_string()),
        ("$TOT", "2".to_string()),
        ("$P1N", "FSC-A".to_string()),
        ("$P1B", "64".to_string()),
        ("$P1R", "262144".to_string()),
    ];
    let data: Vec<u8> = [1.5f64, -2.25]
        .iter()
        .flat_map(|v| v.to_be_bytes())
        .collect();
    let table = parse_fcs(&build_fcs(&kw, &data)).unwrap();
    assert_eq!(table.column("FSC-A").unwrap(), &[1.5, -2.25]);

    assert_eq!(
        parse_byte_order(Some("1,2,3,4,5,6,7,8")).unwrap(),
        ByteOrder::Little
    );
    assert!(parse_byte_order(Some("3,4,1,2")).is_err());
}

#[test]
fn test_missing_parameter_name_rejected() {
    let kw: Vec<(&str, String)> = float_keywords(1)
        .into_iter()
        .filter(|(k, _)| *k != "$P2N")
        .collect();
    let err = parse_fcs(&build_fcs(&kw, &float_data(&[1.0, 2.0]))).unwrap_err();
    assert!(matches!(err, InputError::Format(ref m) if m.contains("$P2N")));
}

#[test]
fn test_text_segment_escaped_delimiter() {
    let kw = parse_text_segment(b"/$P1S/CD4//CD8/$PAR/1/").unwrap();
    assert_eq!(kw.get("$P1S").map(|s| s.as_str()), Some("CD4/CD8"));
    assert_eq!(kw.get("$PAR").map(|s| s.as_str()), Some("1"));
}

#[test]
fn test_text_segment_unpaired_rejected() {
    assert!(parse_text_segment(b"/$PAR/1/$TOT/").is_err());
}
