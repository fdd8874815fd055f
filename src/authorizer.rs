use super::*;

/// Verdict on a `mining.authorize` request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Authorization {
    pub authorized: bool,
    pub disconnect: bool,
    pub difficulty: Option<f64>,
    pub error: Option<String>,
}

impl Authorization {
    pub fn accept() -> Self {
        Self {
            authorized: true,
            ..Default::default()
        }
    }

    pub fn reject(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(
        &self,
        remote: SocketAddr,
        username: &str,
        password: Option<&str>,
    ) -> Authorization;
}

/// Authorizes every worker.
pub struct AcceptAll;

#[async_trait]
impl Authorizer for AcceptAll {
    async fn authorize(&self, _: SocketAddr, _: &str, _: Option<&str>) -> Authorization {
        Authorization::accept()
    }
}

/// Requires the part of the username before the first `.` to be an address
/// the node accepts.
pub struct AddressAuthorizer {
    daemon: Arc<dyn Daemon>,
}

impl AddressAuthorizer {
    pub fn new(daemon: Arc<dyn Daemon>) -> Self {
        Self { daemon }
    }
}

#[async_trait]
impl Authorizer for AddressAuthorizer {
    async fn authorize(
        &self,
        remote: SocketAddr,
        username: &str,
        _: Option<&str>,
    ) -> Authorization {
        let address = username.split('.').next().unwrap_or_default();

        if address.is_empty() {
            return Authorization::reject("empty username");
        }

        match self.daemon.validate_address(address).await {
            Ok(validated) if validated.isvalid => Authorization::accept(),
            Ok(_) => {
                warn!("Rejecting worker {username} from {remote}: invalid address");
                Authorization::reject(format!("invalid address {address}"))
            }
            Err(err) => {
                warn!("Address validation for {username} failed: {err}");
                Authorization::reject("address validation unavailable")
            }
        }
    }
}
