//! pkgstore - client library for package stores.
//!
//! Provides the authenticated-session machinery every store interaction
//! depends on:
//! - layered credential storage: environment override, system keyring, and
//!   an opt-in file fallback
//! - macaroon credential lifecycle: login with third-party discharge,
//!   refresh, revocation
//! - an authenticated request gateway with a typed error taxonomy and a
//!   single refresh-and-retry on authorization rejection
//! - upload review tracking that polls the store to a terminal outcome
//!
//! The HTTP transport and the discharge authority are capability traits;
//! production code uses the bundled reqwest transport while tests script
//! exchanges with fakes.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod upload;

pub use api::{Endpoints, LoginRequest, Package, RequestGateway, PACKAGE_STORE, SSO_STORE};
pub use auth::{
    AuthSession, Credential, Discharger, MacaroonPair, Permission, SecretBackend, SsoDischarger,
    Token,
};
pub use client::StoreClient;
pub use config::{ClientConfig, StoreFamily};
pub use error::{Error, Result, StoreErrorList};
pub use models::{ReleaseRequest, ReviewError, UploadStatus, WhoamiResponse};
pub use upload::{PollPolicy, UploadJob, UploadOutcome, UploadTracker};
