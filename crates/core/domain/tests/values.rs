use domain::{Readings, RegisterValue};

#[test]
fn readings_keep_missing_keys() {
    let mut readings = Readings::new();
    readings.insert("temp_in_c".to_string(), Some(RegisterValue::F64(41.5)));
    readings.insert("request_type".to_string(), None);

    assert_eq!(readings.len(), 2);
    assert_eq!(readings["temp_in_c"].map(|value| value.as_f64()), Some(41.5));
    assert!(readings["request_type"].is_none());
    assert_eq!(RegisterValue::from(7u16).to_string(), "7");
}
