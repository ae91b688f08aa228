use super::*;

#[test]
fn utf8_is_exact() {
    let (text, decoding) = decode_text("naïve café".as_bytes(), &TextEncoding::DEFAULT_CHAIN);
    assert_eq!(text, "naïve café");
    assert_eq!(decoding, Decoding::Exact(TextEncoding::Utf8));
}

#[test]
fn bom_is_kept_by_plain_utf8_and_stripped_by_utf8_sig() {
    let bytes = [UTF8_BOM, b"hello".as_slice()].concat();

    assert_eq!(
        TextEncoding::Utf8.decode(&bytes).as_deref(),
        Some("\u{FEFF}hello")
    );
    assert_eq!(TextEncoding::Utf8Sig.decode(&bytes).as_deref(), Some("hello"));
}

#[test]
fn latin1_fallback() {
    // "café" in latin-1
    let bytes = [b'c', b'a', b'f', 0xE9];
    let (text, decoding) = decode_text(&bytes, &TextEncoding::DEFAULT_CHAIN);
    assert_eq!(text, "café");
    assert_eq!(decoding, Decoding::Fallback(TextEncoding::Latin1));
}

#[test]
fn cp1252_maps_smart_quotes() {
    let bytes = [0x93, b'h', b'i', 0x94];
    assert_eq!(
        TextEncoding::Cp1252.decode(&bytes).as_deref(),
        Some("\u{201C}hi\u{201D}")
    );
}

#[test]
fn cp1252_rejects_undefined_bytes() {
    assert_eq!(TextEncoding::Cp1252.decode(&[b'a', 0x81]), None);
}

#[test]
fn lossy_when_chain_exhausted() {
    let bytes = [b'o', b'k', 0xFF, 0x81];
    let (text, decoding) = decode_text(&bytes, &[TextEncoding::Utf8, TextEncoding::Cp1252]);
    assert_eq!(decoding, Decoding::Lossy);
    assert!(text.starts_with("ok"));
    assert!(text.contains('\u{FFFD}'));
}

#[test]
fn encoding_names_round_trip_through_serde() {
    let names: Vec<String> = TextEncoding::DEFAULT_CHAIN
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        names,
        ["utf-8", "utf-8-sig", "latin-1", "cp1252", "iso-8859-1"]
    );

    let parsed: Vec<TextEncoding> =
        serde_json::from_str(r#"["cp1252", "utf-8-sig"]"#).expect("should parse names");
    assert_eq!(parsed, [TextEncoding::Cp1252, TextEncoding::Utf8Sig]);
}
