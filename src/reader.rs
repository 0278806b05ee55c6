//! Card Data Reader
//!
//! Walks every slot the middleware exposes and collects raw label/value pairs
//! from whichever cards it can open sessions against. Slots without a card
//! are skipped; an object-enumeration failure halts the walk entirely, since
//! it means the token itself is misbehaving rather than merely absent.

use crate::pkcs11::{CardSession, Middleware, MiddlewareError, ObjectKind, RawObject};

pub const NO_READER_MESSAGE: &str = "Could not find any reader with a card inserted";

/// Raw read outcome, before field decoding. Success and message aggregate
/// across slots: once any slot's enumeration completes the result stays
/// successful, whatever later slots do.
#[derive(Debug, Clone)]
pub struct RawCardData {
    pub success: bool,
    pub message: String,
    pub fields: Vec<(String, Vec<u8>)>,
}

impl RawCardData {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            fields: Vec::new(),
        }
    }
}

/// Read every data object (and, optionally, certificate object) off the
/// inserted card(s). Certificates are noticeably slower to pull, hence the
/// toggle.
pub fn read_card(middleware: &dyn Middleware, include_certificates: bool) -> RawCardData {
    let slot_ids = match middleware.slot_ids() {
        Ok(slot_ids) => slot_ids,
        Err(e) => return RawCardData::failure(e.to_string()),
    };

    let mut result = RawCardData::failure(NO_READER_MESSAGE);

    for slot_id in slot_ids {
        let session = match middleware.open_session(slot_id) {
            Ok(session) => session,
            Err(e) => {
                // No card in this reader, or the reader is busy.
                tracing::debug!(slot_id, error = %e, "Skipping slot");
                continue;
            }
        };

        let objects = match slot_objects(session.as_ref(), include_certificates) {
            Ok(objects) => objects,
            Err(e) => {
                tracing::warn!(slot_id, error = %e, "Object enumeration failed, halting slot walk");
                if !result.success {
                    result.message = e.to_string();
                }
                break;
            }
        };

        for object in objects {
            let RawObject {
                label: Some(label),
                mut values,
            } = object
            else {
                continue;
            };
            // One value blob per object is the expected shape; anything else
            // is a template mismatch and the field is skipped.
            if values.len() != 1 {
                tracing::debug!(label = %label, count = values.len(), "Unexpected value count, skipping");
                continue;
            }
            if let Some(value) = values.pop() {
                result.fields.push((label, value));
            }
        }

        result.success = true;
        result.message = "OK".to_string();
    }

    result
}

fn slot_objects(
    session: &dyn CardSession,
    include_certificates: bool,
) -> Result<Vec<RawObject>, MiddlewareError> {
    let mut objects = session.read_objects(ObjectKind::Data)?;
    if include_certificates {
        objects.extend(session.read_objects(ObjectKind::Certificate)?);
    }
    Ok(objects)
}
