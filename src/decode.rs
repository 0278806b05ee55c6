//! Field classification and decoding
//!
//! Every label the eID applet exposes is pre-assigned one of four encodings.
//! The inventory comes from the Fedict applet 1.8 ID/address file data sheet.
//! Labels outside the tables are dropped, as are fields whose bytes do not
//! match their assigned text encoding; card contents vary in the wild and a
//! bad field must never take down the whole read.

use base64::Engine as _;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEncoding {
    Utf8,
    Ascii,
    Hex,
    Base64,
}

const UTF8_FIELDS: &[&str] = &[
    "carddata_os_number",
    "carddata_os_version",
    "carddata_soft_mask_number",
    "carddata_soft_mask_version",
    "carddata_appl_version",
    "carddata_glob_os_version",
    "carddata_appl_int_version",
    "carddata_pkcs1_support",
    "carddata_key_exchange_version",
    "carddata_appl_lifecycle",
    "issuing_municipality",
    "surname",
    "firstnames",
    "first_letter_of_third_given_name",
    "nationality",
    "location_of_birth",
    "date_of_birth",
    "nobility",
    "address_street_and_number",
    "address_zip",
    "address_municipality",
    "member_of_family",
];

const ASCII_FIELDS: &[&str] = &[
    "card_number",
    "validity_begin_date",
    "validity_end_date",
    "national_number",
    "gender",
    "document_type",
    "special_status",
    "duplicata",
    "special_organization",
    "date_and_country_of_protection",
];

const HEX_FIELDS: &[&str] = &[
    "chip_number",
    "photo_hash",
    "basic_key_hash",
    "carddata_appl_version",
];

const BASE64_FIELDS: &[&str] = &[
    "PHOTO_FILE",
    "DATA_FILE",
    "ADDRESS_FILE",
    "CERT_RN_FILE",
    "SIGN_DATA_FILE",
    "SIGN_ADDRESS_FILE",
    "BASIC_KEY_FILE",
    "Authentication",
    "Signature",
    "CA",
    "Root",
];

// carddata_serialnumber and carddata_comp_code are deliberately absent: the
// bytes they carry fit none of the four encodings.

/// Look up the encoding assigned to a label. The tables are checked in a
/// fixed priority order: carddata_appl_version appears under both UTF-8 and
/// hex in the applet data sheet, and UTF-8 wins here.
pub fn classify(label: &str) -> Option<FieldEncoding> {
    if UTF8_FIELDS.contains(&label) {
        Some(FieldEncoding::Utf8)
    } else if ASCII_FIELDS.contains(&label) {
        Some(FieldEncoding::Ascii)
    } else if HEX_FIELDS.contains(&label) {
        Some(FieldEncoding::Hex)
    } else if BASE64_FIELDS.contains(&label) {
        Some(FieldEncoding::Base64)
    } else {
        None
    }
}

/// Sink for per-field decode failures. A field that fails to decode is
/// dropped from the result; the sink lets operators notice when that starts
/// happening systematically.
pub trait DecodeDiagnostics {
    fn decode_failed(&self, label: &str, encoding: FieldEncoding, raw: &[u8]);
}

/// Default sink: a structured tracing event.
pub struct TracingDiagnostics;

impl DecodeDiagnostics for TracingDiagnostics {
    fn decode_failed(&self, label: &str, encoding: FieldEncoding, raw: &[u8]) {
        tracing::warn!(
            label,
            encoding = ?encoding,
            raw = %hex::encode(raw),
            "Field failed to decode"
        );
    }
}

/// Decode one raw field. Returns None silently for unknown labels, and None
/// with a diagnostic when the bytes do not match the label's encoding. Never
/// propagates an error past this boundary.
pub fn decode_field(
    label: &str,
    raw: &[u8],
    diagnostics: &dyn DecodeDiagnostics,
) -> Option<String> {
    let encoding = classify(label)?;
    match encoding {
        FieldEncoding::Utf8 => match std::str::from_utf8(raw) {
            Ok(text) => Some(text.to_string()),
            Err(_) => {
                diagnostics.decode_failed(label, encoding, raw);
                None
            }
        },
        FieldEncoding::Ascii => match std::str::from_utf8(raw) {
            Ok(text) if text.is_ascii() => Some(text.to_string()),
            _ => {
                diagnostics.decode_failed(label, encoding, raw);
                None
            }
        },
        FieldEncoding::Hex => Some(hex::encode(raw)),
        FieldEncoding::Base64 => Some(base64::engine::general_purpose::STANDARD.encode(raw)),
    }
}

/// Decode every raw field the reader produced. Fields that fail to decode or
/// carry unknown labels are left out.
pub fn decode_fields(
    fields: &[(String, Vec<u8>)],
    diagnostics: &dyn DecodeDiagnostics,
) -> BTreeMap<String, String> {
    let mut decoded = BTreeMap::new();
    for (label, raw) in fields {
        if let Some(value) = decode_field(label, raw, diagnostics) {
            decoded.insert(label.clone(), value);
        }
    }
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every reported failure so tests can assert on them.
    #[derive(Default)]
    struct RecordingDiagnostics {
        failures: Mutex<Vec<String>>,
    }

    impl DecodeDiagnostics for RecordingDiagnostics {
        fn decode_failed(&self, label: &str, _encoding: FieldEncoding, _raw: &[u8]) {
            self.failures.lock().unwrap().push(label.to_string());
        }
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_every_utf8_label_classifies_utf8() {
        for label in UTF8_FIELDS {
            assert_eq!(classify(label), Some(FieldEncoding::Utf8), "{}", label);
        }
    }

    #[test]
    fn test_every_ascii_label_classifies_ascii() {
        for label in ASCII_FIELDS {
            assert_eq!(classify(label), Some(FieldEncoding::Ascii), "{}", label);
        }
    }

    #[test]
    fn test_every_hex_label_classifies_hex() {
        for label in HEX_FIELDS {
            // carddata_appl_version is also listed under UTF-8, which wins.
            let expected = if UTF8_FIELDS.contains(label) {
                FieldEncoding::Utf8
            } else {
                FieldEncoding::Hex
            };
            assert_eq!(classify(label), Some(expected), "{}", label);
        }
    }

    #[test]
    fn test_every_blob_label_classifies_base64() {
        for label in BASE64_FIELDS {
            assert_eq!(classify(label), Some(FieldEncoding::Base64), "{}", label);
        }
    }

    #[test]
    fn test_unknown_label_not_classified() {
        assert_eq!(classify("carddata_serialnumber"), None);
        assert_eq!(classify("carddata_comp_code"), None);
        assert_eq!(classify("totally_made_up"), None);
    }

    // ==================== Decoding Tests ====================

    #[test]
    fn test_utf8_field_decodes() {
        let diag = RecordingDiagnostics::default();
        let value = decode_field("surname", "Dupont".as_bytes(), &diag);
        assert_eq!(value.as_deref(), Some("Dupont"));
    }

    #[test]
    fn test_utf8_field_accepts_accents() {
        let diag = RecordingDiagnostics::default();
        let value = decode_field("firstnames", "Ren\u{e9}".as_bytes(), &diag);
        assert_eq!(value.as_deref(), Some("Ren\u{e9}"));
    }

    #[test]
    fn test_ascii_field_decodes() {
        let diag = RecordingDiagnostics::default();
        let value = decode_field("card_number", b"592-1234567-89", &diag);
        assert_eq!(value.as_deref(), Some("592-1234567-89"));
    }

    #[test]
    fn test_hex_field_renders_lowercase() {
        let diag = RecordingDiagnostics::default();
        let value = decode_field("chip_number", &[0x0A, 0x0B], &diag);
        assert_eq!(value.as_deref(), Some("0a0b"));
    }

    #[test]
    fn test_blob_field_renders_base64() {
        let diag = RecordingDiagnostics::default();
        let value = decode_field("PHOTO_FILE", b"hi", &diag);
        assert_eq!(value.as_deref(), Some("aGk="));
    }

    #[test]
    fn test_unknown_label_skipped_silently() {
        let diag = RecordingDiagnostics::default();
        assert_eq!(decode_field("not_a_field", &[0xFF, 0xFE], &diag), None);
        assert!(diag.failures.lock().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_utf8_dropped_with_diagnostic() {
        let diag = RecordingDiagnostics::default();
        assert_eq!(decode_field("surname", &[0xC3, 0x28], &diag), None);
        assert_eq!(*diag.failures.lock().unwrap(), vec!["surname".to_string()]);
    }

    #[test]
    fn test_non_ascii_bytes_dropped_from_ascii_field() {
        let diag = RecordingDiagnostics::default();
        // Valid UTF-8 but not 7-bit ASCII.
        assert_eq!(decode_field("gender", "\u{e9}".as_bytes(), &diag), None);
        assert_eq!(*diag.failures.lock().unwrap(), vec!["gender".to_string()]);
    }

    #[test]
    fn test_decode_fields_drops_only_bad_field() {
        let diag = RecordingDiagnostics::default();
        let fields = vec![
            ("surname".to_string(), vec![0xC3, 0x28]),
            ("nationality".to_string(), b"Belg".to_vec()),
            ("unknown_label".to_string(), b"xyz".to_vec()),
        ];

        let decoded = decode_fields(&fields, &diag);

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.get("nationality").map(String::as_str), Some("Belg"));
        assert_eq!(*diag.failures.lock().unwrap(), vec!["surname".to_string()]);
    }
}
