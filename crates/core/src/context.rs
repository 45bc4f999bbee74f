//! Request context consulted by token checks.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};

use crate::error::{DomainError, DomainResult};

/// Read-only view of the request being served.
///
/// Built once per request by the transport layer and handed to the auth
/// service. Header names are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    received_at: DateTime<Utc>,
    client_addr: Option<IpAddr>,
    headers: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(received_at: DateTime<Utc>) -> Self {
        Self {
            received_at,
            client_addr: None,
            headers: HashMap::new(),
        }
    }

    /// Context stamped with the current wall-clock time.
    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn with_client_addr(mut self, addr: IpAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    /// Parse and attach the client address (e.g. from a socket peer string).
    pub fn with_client_addr_str(self, addr: &str) -> DomainResult<Self> {
        let parsed = addr
            .trim()
            .parse::<IpAddr>()
            .map_err(|e| DomainError::validation(format!("client address '{addr}': {e}")))?;
        Ok(self.with_client_addr(parsed))
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn client_addr(&self) -> Option<IpAddr> {
        self.client_addr
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }
}
