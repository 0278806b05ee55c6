//! PKCS#11 middleware access
//!
//! Wraps the vendor library via cryptoki behind the `Middleware` trait so the
//! card reader can run against a fake implementation in tests, without
//! physical hardware.
//!
//! Lifecycle is per-request: callers load the library, walk the slots, and
//! drop everything. No sessions or slot handles are cached across requests.

use cryptoki::context::{CInitializeArgs, Pkcs11};
use cryptoki::object::{Attribute, AttributeType, ObjectClass};
use cryptoki::session::Session;
use cryptoki::slot::Slot;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MiddlewareError {
    #[error("Failed to load PKCS#11 library {path}: {reason}")]
    LibraryLoad { path: String, reason: String },
    #[error("Failed to enumerate slots: {0}")]
    SlotEnumeration(String),
    #[error("Failed to open session in slot {slot_id}: {reason}")]
    SessionOpen { slot_id: u64, reason: String },
    #[error("Failed to enumerate card objects in slot {slot_id}: {reason}")]
    ObjectEnumeration { slot_id: u64, reason: String },
    #[error("Failed to read object attributes in slot {slot_id}: {reason}")]
    AttributeRead { slot_id: u64, reason: String },
    #[error("Unknown slot id: {0}")]
    UnknownSlot(u64),
}

/// Object classes the reader asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Data,
    Certificate,
}

/// One object pulled off the card: its label attribute, if present, and every
/// value blob the token returned for it. Exactly one value blob is the
/// expected shape; the reader decides what to do with anything else.
#[derive(Debug, Clone)]
pub struct RawObject {
    pub label: Option<String>,
    pub values: Vec<Vec<u8>>,
}

/// Slot description, used by the /debug endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDescription {
    pub description: String,
    pub manufacturer: String,
}

/// An open session against one slot.
pub trait CardSession {
    fn read_objects(&self, kind: ObjectKind) -> Result<Vec<RawObject>, MiddlewareError>;
}

/// The native middleware seam. Production code goes through
/// [`CryptokiMiddleware`]; tests inject fakes.
pub trait Middleware: Send + Sync {
    fn slot_ids(&self) -> Result<Vec<u64>, MiddlewareError>;

    fn open_session(&self, slot_id: u64) -> Result<Box<dyn CardSession + '_>, MiddlewareError>;

    fn slot_info(&self, slot_id: u64) -> Result<SlotDescription, MiddlewareError>;
}

// ==================== Cryptoki implementation ====================

pub struct CryptokiMiddleware {
    pkcs11: Pkcs11,
}

impl CryptokiMiddleware {
    /// Load and initialize the vendor library. Fails when the file is missing
    /// or is not a PKCS#11 module. Finalization happens on drop.
    pub fn load(library_path: &str) -> Result<Self, MiddlewareError> {
        let load_error = |e: cryptoki::error::Error| MiddlewareError::LibraryLoad {
            path: library_path.to_string(),
            reason: e.to_string(),
        };

        let pkcs11 = Pkcs11::new(library_path).map_err(load_error)?;
        pkcs11
            .initialize(CInitializeArgs::OsThreads)
            .map_err(load_error)?;

        Ok(Self { pkcs11 })
    }

    fn slot(&self, slot_id: u64) -> Result<Slot, MiddlewareError> {
        self.pkcs11
            .get_all_slots()
            .map_err(|e| MiddlewareError::SlotEnumeration(e.to_string()))?
            .into_iter()
            .find(|slot| slot.id() == slot_id)
            .ok_or(MiddlewareError::UnknownSlot(slot_id))
    }
}

impl Middleware for CryptokiMiddleware {
    fn slot_ids(&self) -> Result<Vec<u64>, MiddlewareError> {
        let slots = self
            .pkcs11
            .get_all_slots()
            .map_err(|e| MiddlewareError::SlotEnumeration(e.to_string()))?;
        Ok(slots.iter().map(Slot::id).collect())
    }

    fn open_session(&self, slot_id: u64) -> Result<Box<dyn CardSession + '_>, MiddlewareError> {
        let slot = self.slot(slot_id)?;
        let session = self
            .pkcs11
            .open_ro_session(slot)
            .map_err(|e| MiddlewareError::SessionOpen {
                slot_id,
                reason: e.to_string(),
            })?;
        Ok(Box::new(CryptokiSession { session, slot_id }))
    }

    fn slot_info(&self, slot_id: u64) -> Result<SlotDescription, MiddlewareError> {
        let slot = self.slot(slot_id)?;
        let info = self
            .pkcs11
            .get_slot_info(slot)
            .map_err(|e| MiddlewareError::SlotEnumeration(e.to_string()))?;
        Ok(SlotDescription {
            description: info.slot_description().trim().to_string(),
            manufacturer: info.manufacturer_id().trim().to_string(),
        })
    }
}

struct CryptokiSession {
    session: Session,
    slot_id: u64,
}

impl CardSession for CryptokiSession {
    fn read_objects(&self, kind: ObjectKind) -> Result<Vec<RawObject>, MiddlewareError> {
        let class = match kind {
            ObjectKind::Data => ObjectClass::DATA,
            ObjectKind::Certificate => ObjectClass::CERTIFICATE,
        };

        let template = vec![Attribute::Class(class)];
        let handles =
            self.session
                .find_objects(&template)
                .map_err(|e| MiddlewareError::ObjectEnumeration {
                    slot_id: self.slot_id,
                    reason: e.to_string(),
                })?;

        let mut objects = Vec::with_capacity(handles.len());
        for handle in handles {
            let attrs = self
                .session
                .get_attributes(handle, &[AttributeType::Label, AttributeType::Value])
                .map_err(|e| MiddlewareError::AttributeRead {
                    slot_id: self.slot_id,
                    reason: e.to_string(),
                })?;

            let mut label = None;
            let mut values = Vec::new();
            for attr in attrs {
                match attr {
                    Attribute::Label(bytes) => label = String::from_utf8(bytes).ok(),
                    Attribute::Value(bytes) => values.push(bytes),
                    _ => {}
                }
            }
            objects.push(RawObject { label, values });
        }

        Ok(objects)
    }
}
