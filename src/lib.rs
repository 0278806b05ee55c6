//! Belgian eID middleware bridge
//!
//! Exposes the data stored on a Belgian electronic identity card over a small
//! REST API. Card access goes through the vendor PKCS#11 middleware via
//! cryptoki; every field read off the card is decoded according to a fixed
//! per-label charset table before being returned as JSON.
//!
//! Key pieces:
//! - per-OS resolution of the vendor library path
//! - a slot/session walk that tolerates empty readers
//! - four-way field classification (UTF-8 / ASCII / hex / base64)

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

pub mod config;
pub mod decode;
pub mod handlers;
pub mod pkcs11;
pub mod reader;
pub mod server;

pub use config::Config;
pub use pkcs11::{CardSession, Middleware, MiddlewareError};
pub use reader::RawCardData;
