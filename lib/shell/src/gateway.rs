//! The network-gateway contract.
//!
//! Real HTTP lives outside the sandbox: the gateway enforces its host
//! allowlist and emits audit events. The `curl`/`wget` builtins only see
//! this trait; a denied request is a policy error printed verbatim, not
//! an I/O error.

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum GatewayError {
    /// The allowlist said no. Printed verbatim by the builtins.
    #[error("network access denied: {0}")]
    Denied(String),
    #[error("network error: {0}")]
    Transport(String),
}

/// Host-mediated HTTP. The default implementation denies everything.
pub trait NetworkGateway: Send + Sync {
    fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, GatewayError>;
}

/// The closed-by-default gateway.
pub struct DenyAllGateway;

impl NetworkGateway for DenyAllGateway {
    fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, GatewayError> {
        Err(GatewayError::Denied(request.url))
    }
}
