use super::*;

fn int_layout() -> KeyLayout {
    KeyLayout::new(vec![Field::I32, Field::I64], false).unwrap()
}

#[test]
fn signed_integers_compare_numerically() {
    let f = Field::I16;
    let minus_one = (-1i16).to_le_bytes();
    let one = 1i16.to_le_bytes();
    let large = 300i16.to_le_bytes();
    assert_eq!(Ordering::Less, f.compare(&minus_one, &one));
    assert_eq!(Ordering::Less, f.compare(&one, &large));
    assert_eq!(Ordering::Equal, f.compare(&large, &large));

    let f = Field::I8;
    assert_eq!(Ordering::Less, f.compare(&[0x80], &[0x7f]));

    let f = Field::I64;
    assert_eq!(
        Ordering::Greater,
        f.compare(&i64::MAX.to_le_bytes(), &i64::MIN.to_le_bytes())
    );
}

#[test]
fn strings_compare_content_then_length() {
    let f = Field::String(8);
    let a = KeyBuilder::new().string(8, "ab").build();
    let abc = KeyBuilder::new().string(8, "abc").build();
    let b = KeyBuilder::new().string(8, "b").build();
    assert_eq!(Ordering::Less, f.compare(&a, &abc));
    assert_eq!(Ordering::Less, f.compare(&abc, &b));

    // Padding bytes after the content must not influence the order
    let mut dirty = a.clone();
    dirty[7] = 0xff;
    assert_eq!(Ordering::Equal, f.compare(&a, &dirty));

    // Too long strings are truncated to the field width
    let truncated = KeyBuilder::new().string(8, "abcdefghij").build();
    assert_eq!(8, truncated.len());
    assert_eq!(
        Some(FieldValue::String("abcdef".to_string())),
        KeyLayout::new(vec![f], false)
            .unwrap()
            .decode_field(&truncated, 0)
    );
}

#[test]
fn composite_order_stops_at_first_difference() {
    let layout = int_layout();
    let a = KeyBuilder::new().i32(1).i64(100).build();
    let b = KeyBuilder::new().i32(2).i64(-100).build();
    let c = KeyBuilder::new().i32(2).i64(5).build();
    assert_eq!(Ordering::Less, layout.compare(&a, &[], &b, &[]));
    assert_eq!(Ordering::Less, layout.compare(&b, &[], &c, &[]));
    assert_eq!(Ordering::Greater, layout.compare(&c, &[], &a, &[]));
}

#[test]
fn partial_probe_only_uses_provided_fields() {
    let layout = int_layout();
    let prefix = KeyBuilder::new().i32(2).build();
    let probe = layout.probe(&prefix, None).unwrap();
    assert!(!layout.is_complete(&probe));

    let first = KeyBuilder::new().i32(2).i64(i64::MIN).build();
    let last = KeyBuilder::new().i32(2).i64(i64::MAX).build();
    let other = KeyBuilder::new().i32(3).i64(i64::MIN).build();
    assert_eq!(Ordering::Equal, layout.compare_probe(&probe, &first, &[]));
    assert_eq!(Ordering::Equal, layout.compare_probe(&probe, &last, &[]));
    assert_eq!(Ordering::Less, layout.compare_probe(&probe, &other, &[]));
}

#[test]
fn probe_must_end_on_field_boundary() {
    let layout = int_layout();
    assert_eq!(12, layout.key_size());
    assert_eq!(Some(1), layout.fields_in(4));
    assert_eq!(Some(2), layout.fields_in(12));
    assert!(layout.probe(&[0; 5], None).unwrap_err().is_invalid_input());
    assert!(layout.probe(&[], None).unwrap_err().is_invalid_input());
    assert!(layout.validate_full_key(&[0; 4]).is_err());
    assert!(layout.validate_full_key(&[0; 12]).is_ok());
}

#[test]
fn value_is_tie_break_only_for_duplicates() {
    let key = KeyBuilder::new().i32(7).i64(7).build();

    let unique = int_layout();
    assert_eq!(Ordering::Equal, unique.compare(&key, b"a", &key, b"b"));
    let probe = unique.probe(&key, Some(b"a")).unwrap();
    assert!(unique.is_complete(&probe));
    assert_eq!(Ordering::Equal, unique.compare_probe(&probe, &key, b"b"));

    let duplicates = KeyLayout::new(vec![Field::I32, Field::I64], true).unwrap();
    assert_eq!(Ordering::Less, duplicates.compare(&key, b"a", &key, b"b"));
    let probe = duplicates.probe(&key, Some(b"a")).unwrap();
    assert!(duplicates.is_complete(&probe));
    assert_eq!(Ordering::Less, duplicates.compare_probe(&probe, &key, b"b"));

    // Without a value the probe matches all duplicates of the key
    let probe = duplicates.probe(&key, None).unwrap();
    assert!(!duplicates.is_complete(&probe));
    assert_eq!(Ordering::Equal, duplicates.compare_probe(&probe, &key, b"b"));
}

#[test]
fn invalid_layouts() {
    assert!(matches!(KeyLayout::new(vec![], false), Err(Error::NoFields)));
    assert!(matches!(
        KeyLayout::new(vec![Field::Bytes(0)], false),
        Err(Error::InvalidField(_))
    ));
    assert!(matches!(
        KeyLayout::new(vec![Field::String(2)], false),
        Err(Error::InvalidField(_))
    ));
}

#[test]
fn describe_keys() {
    let layout = KeyLayout::new(vec![Field::I8, Field::Bytes(2), Field::String(6)], false).unwrap();
    let key = KeyBuilder::new()
        .i8(-3)
        .bytes(2, &[0xab])
        .string(6, "xy")
        .build();
    assert_eq!("(-3, 0xab00, \"xy\")", layout.describe(&key));
    // Partial keys only show the present fields
    assert_eq!("(-3)", layout.describe(&key[0..1]));
}
