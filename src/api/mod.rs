//! Store API plumbing: endpoint tables, the transport capability and the
//! authenticated request gateway.

pub mod endpoints;
pub mod gateway;
pub mod transport;

pub use endpoints::{Endpoints, LoginRequest, Package, PACKAGE_STORE, SSO_STORE};
pub use gateway::RequestGateway;
pub use transport::{
    Body, HttpTransport, Method, ReqwestTransport, TransportRequest, TransportResponse,
};
