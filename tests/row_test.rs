use lumbung::types::{
    row::Row,
    value::{DataType, Value},
};

fn roundtrip(row: &Row) -> Row {
    Row::from_bytes(&row.to_bytes()).unwrap()
}

#[test]
fn test_value_creation_and_data_types() {
    assert_eq!(Value::Null.data_type(), DataType::Null);
    assert_eq!(Value::Integer(42).data_type(), DataType::Integer);
    assert_eq!(Value::Real(3.14).data_type(), DataType::Real);
    assert_eq!(Value::Text("hello".to_string()).data_type(), DataType::Text);
    assert_eq!(Value::Blob(vec![1, 2, 3]).data_type(), DataType::Blob);
}

#[test]
fn test_value_roundtrip_every_type() {
    let values = vec![
        Value::Null,
        Value::Integer(0),
        Value::Integer(i64::MIN),
        Value::Integer(i64::MAX),
        Value::Real(3.14),
        Value::Real(-0.0),
        Value::Text(String::new()),
        Value::Text("hello world".to_string()),
        Value::Blob(Vec::new()),
        Value::Blob(vec![0xde, 0xad, 0xbe, 0xef]),
    ];
    for value in values {
        let bytes = value.to_bytes();
        assert_eq!(Value::from_bytes(&bytes).unwrap(), value);
        assert_eq!(bytes.len(), value.serialized_size());
    }
}

#[test]
fn test_integer_and_real_tags_are_distinct() {
    // 1 and 1.0 have identical little-endian payload shapes in other
    // encodings; the tag must disambiguate.
    let int_bytes = Value::Integer(1).to_bytes();
    let real_bytes = Value::Real(1.0).to_bytes();
    assert_ne!(int_bytes[0], real_bytes[0]);
    assert_eq!(Value::from_bytes(&int_bytes).unwrap(), Value::Integer(1));
    assert_eq!(Value::from_bytes(&real_bytes).unwrap(), Value::Real(1.0));
}

#[test]
fn test_row_roundtrip_with_and_without_row_id() {
    let row = Row::new(vec![
        Value::Integer(7),
        Value::Text("alice".to_string()),
        Value::Real(99.5),
    ]);
    assert_eq!(roundtrip(&row), row);

    let row = Row::with_row_id(
        42,
        vec![Value::Null, Value::Blob(vec![1, 2, 3]), Value::Integer(-1)],
    );
    assert_eq!(roundtrip(&row), row);
}

#[test]
fn test_row_roundtrip_empty_and_large() {
    let empty = Row::new(Vec::new());
    assert_eq!(roundtrip(&empty), empty);

    let large = Row::with_row_id(
        1,
        vec![
            Value::Text("x".repeat(100_000)),
            Value::Blob(vec![0xab; 50_000]),
        ],
    );
    assert_eq!(roundtrip(&large), large);
}

#[test]
fn test_row_size_matches_encoding() {
    let row = Row::with_row_id(
        9,
        vec![
            Value::Integer(1),
            Value::Text("name".to_string()),
            Value::Null,
        ],
    );
    assert_eq!(row.size(), row.to_bytes().len());
}

#[test]
fn test_decode_rejects_garbage() {
    assert!(Row::from_bytes(&[]).is_err());
    assert!(Value::from_bytes(&[99]).is_err());

    // Truncated text length prefix.
    let mut bytes = Value::Text("hello".to_string()).to_bytes();
    bytes.truncate(3);
    assert!(Value::from_bytes(&bytes).is_err());

    // Row claiming more values than the buffer holds.
    let mut row_bytes = Row::new(vec![Value::Integer(5)]).to_bytes();
    row_bytes[1] = 9; // value_count low byte
    assert!(Row::from_bytes(&row_bytes).is_err());
}

#[test]
fn test_value_comparison_rules() {
    assert!(Value::Null < Value::Integer(0));
    assert!(Value::Integer(5) < Value::Real(5.5));
    assert!(Value::Real(5.0) == Value::Integer(5));
    assert!(Value::Text("apple".to_string()) < Value::Text("banana".to_string()));
    assert!(
        Value::Text("a".to_string())
            .partial_cmp(&Value::Blob(vec![97]))
            .is_none()
    );
}

#[test]
fn test_set_value_bounds() {
    let mut row = Row::new(vec![Value::Integer(1)]);
    assert!(row.set_value(0, Value::Integer(2)).is_ok());
    assert!(row.set_value(3, Value::Null).is_err());
}
