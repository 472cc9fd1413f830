//! Authentication: credential storage, encoding and session lifecycle.
//!
//! This module provides:
//! - `SecretBackend`: layered credential persistence (environment override,
//!   system keyring, opt-in file fallback)
//! - `Credential` and its codec: versioned, base64-safe storage encoding
//! - `AuthSession`: login with third-party discharge, refresh, revocation

pub mod backend;
pub mod creds;
pub mod discharge;
pub mod permissions;
pub mod session;

pub use backend::{
    Availability, EnvBackend, FileBackend, KeyringBackend, MemoryBackend, SecretBackend,
    StorageKey,
};
pub use creds::{Credential, MacaroonPair, Token};
pub use discharge::SsoDischarger;
pub use permissions::Permission;
pub use session::{AuthSession, Discharger};
