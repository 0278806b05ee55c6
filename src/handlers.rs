//! REST API handlers
//!
//! The /beid handler composes the reader and the decoder; /debug inspects the
//! environment and the library without ever failing the request.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{Config, LIBRARY_ENV_VAR};
use crate::decode::{self, TracingDiagnostics};
use crate::pkcs11::{CryptokiMiddleware, Middleware, MiddlewareError, SlotDescription};
use crate::reader::{self, RawCardData};

/// Builds a fresh middleware per request; native calls are blocking and
/// nothing is pooled, so each read gets its own library handle. Tests swap
/// in fakes here.
pub type MiddlewareFactory =
    Arc<dyn Fn() -> Result<Box<dyn Middleware>, MiddlewareError> + Send + Sync>;

pub struct AppState {
    pub config: Config,
    pub middleware: MiddlewareFactory,
}

impl AppState {
    /// Production state: every request loads the configured vendor library.
    pub fn new(config: Config) -> Self {
        let library_path = config.library_path.clone();
        let middleware: MiddlewareFactory = Arc::new(move || {
            CryptokiMiddleware::load(&library_path).map(|m| Box::new(m) as Box<dyn Middleware>)
        });
        Self { config, middleware }
    }
}

// ==================== Request / Response Types ====================

#[derive(Debug, Clone, Deserialize)]
pub struct BeidParams {
    /// Also fetch certificate objects. Slower, off by default.
    #[serde(default)]
    pub certs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDataResponse {
    pub success: bool,
    pub message: String,
    /// Decoded card fields, flattened beside the two fixed keys.
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
}

/// Stable error envelope; the same shape a failed read reports inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DebugInfo {
    pub platform: String,
    pub environment: BTreeMap<String, String>,
    pub library_exists: bool,
    pub library_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pkcs11_load: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pkcs11_load_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slots_found: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slots_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_info: Option<SlotDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_info_error: Option<String>,
}

// ==================== Error Handling ====================

pub struct ApiError(pub StatusCode, pub Json<ErrorResponse>);

impl ApiError {
    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError(
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                success: false,
                message: msg.into(),
            }),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

// ==================== Handlers ====================

/// Health check
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Service identity
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "Belgian eID Middleware API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Read all data objects (and optionally certificates) off the inserted card.
pub async fn read_beid(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BeidParams>,
) -> Result<Json<CardDataResponse>, ApiError> {
    tracing::info!(certs = params.certs, "Processing /beid request");

    let factory = state.middleware.clone();
    let include_certificates = params.certs;

    // Native PKCS#11 calls block, and can block for a long time when a
    // reader misbehaves. Keep them off the async workers.
    let result = tokio::task::spawn_blocking(move || {
        let middleware = match factory() {
            Ok(middleware) => middleware,
            Err(e) => {
                // Library resolution failure is an overall-failure result,
                // not an internal error.
                tracing::error!(error = %e, "Middleware load failed");
                return RawCardData::failure(e.to_string());
            }
        };
        reader::read_card(middleware.as_ref(), include_certificates)
    })
    .await
    .map_err(|e| {
        // Panic details go to the log, never into the response body.
        tracing::error!(error = %e, "Card read task failed");
        ApiError::internal("Server error: card read failed")
    })?;

    let fields = decode::decode_fields(&result.fields, &TracingDiagnostics);

    Ok(Json(CardDataResponse {
        success: result.success,
        message: result.message,
        fields,
    }))
}

/// Best-effort environment and middleware diagnostics. Every sub-step is
/// caught independently; this endpoint reports failures, it does not fail.
pub async fn debug_info(State(state): State<Arc<AppState>>) -> Json<DebugInfo> {
    tracing::info!("Processing /debug request");

    let result = tokio::task::spawn_blocking(move || collect_debug_info(&state)).await;

    let info = result.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Debug collection task failed");
        DebugInfo {
            platform: std::env::consts::OS.to_string(),
            pkcs11_load_error: Some(e.to_string()),
            ..Default::default()
        }
    });

    Json(info)
}

fn collect_debug_info(state: &AppState) -> DebugInfo {
    let mut info = DebugInfo {
        platform: std::env::consts::OS.to_string(),
        ..Default::default()
    };
    info.environment.insert(
        LIBRARY_ENV_VAR.to_string(),
        std::env::var(LIBRARY_ENV_VAR).unwrap_or_else(|_| "Not set".to_string()),
    );

    let configured = &state.config.library_path;
    if std::path::Path::new(configured).exists() {
        info.library_exists = true;
        info.library_path = configured.clone();
    } else if let Some(found) = find_library_on_disk() {
        info.library_exists = true;
        info.library_path = found;
    }

    match (state.middleware)() {
        Ok(middleware) => {
            info.pkcs11_load = Some("Success".to_string());
            match middleware.slot_ids() {
                Ok(slot_ids) => {
                    info.slots_found = Some(slot_ids.len());
                    if let Some(&first) = slot_ids.first() {
                        match middleware.slot_info(first) {
                            Ok(desc) => info.slot_info = Some(desc),
                            Err(e) => info.slot_info_error = Some(e.to_string()),
                        }
                    }
                }
                Err(e) => info.slots_error = Some(e.to_string()),
            }
        }
        Err(e) => info.pkcs11_load_error = Some(e.to_string()),
    }

    info
}

/// Diagnostic-only search for the Linux shared library under the usual
/// system library roots. The result never feeds the /beid path.
fn find_library_on_disk() -> Option<String> {
    for root in ["/usr/lib*", "/lib*"] {
        let pattern = format!("{}/**/libbeidpkcs11.so*", root);
        let Ok(paths) = glob::glob(&pattern) else {
            continue;
        };
        if let Some(path) = paths.flatten().next() {
            return Some(path.display().to_string());
        }
    }
    None
}
