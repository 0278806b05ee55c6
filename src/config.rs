//! Service configuration
//!
//! Everything is resolved from the environment once at startup and handed
//! down explicitly; nothing mutates process state afterwards.

use std::env;

/// Environment variable naming the vendor PKCS#11 library. The name is kept
/// from the original middleware deployments so existing installs keep working.
pub const LIBRARY_ENV_VAR: &str = "PYKCS11LIB";

#[derive(Debug, Clone)]
pub struct Config {
    /// Path (or bare soname, resolved by the dynamic linker) of the vendor
    /// PKCS#11 middleware library.
    pub library_path: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let library_path = env::var(LIBRARY_ENV_VAR)
            .unwrap_or_else(|_| default_library_path(env::consts::OS).to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|e| format!("PORT must be a valid number: {}", e))?;

        Ok(Self { library_path, port })
    }
}

/// Default middleware library name for a host OS, as shipped by the official
/// eID packages. Anything that is not Linux or macOS is assumed to be Windows.
pub fn default_library_path(os: &str) -> &'static str {
    match os {
        "linux" => "libbeidpkcs11.so.0",
        "macos" => "libbeidpkcs11.dylib",
        _ => "beidpkcs11.dll",
    }
}
