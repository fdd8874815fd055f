use super::*;

/// Node RPC boundary. Everything the pool needs from the node goes through
/// `cmd`, so tests can substitute an in-process node.
#[async_trait]
pub trait Daemon: Send + Sync {
    async fn cmd(&self, method: &str, params: Value) -> Result<Value>;

    async fn is_online(&self) -> bool {
        self.cmd("getblockchaininfo", json!([])).await.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValidatedAddress {
    pub isvalid: bool,
    #[serde(default)]
    pub pubkey: Option<String>,
}

impl dyn Daemon {
    pub async fn get_block_template(&self) -> Result<RpcTemplate> {
        let result = self
            .cmd(
                "getblocktemplate",
                json!([{
                    "capabilities": ["coinbasetxn", "workid", "coinbase/append"],
                    "rules": ["segwit"],
                }]),
            )
            .await?;

        serde_json::from_value(result).context("failed to deserialize block template")
    }

    pub async fn validate_address(&self, address: &str) -> Result<ValidatedAddress> {
        let result = self.cmd("validateaddress", json!([address])).await?;
        serde_json::from_value(result).context("failed to deserialize validateaddress result")
    }

    /// Submits a block. Returns the node's rejection reason, if any.
    pub async fn submit_block(&self, hex: &str) -> Result<Option<String>> {
        let result = self.cmd("submitblock", json!([hex])).await?;

        Ok(match result {
            Value::Null => None,
            Value::String(reason) => Some(reason),
            other => Some(other.to_string()),
        })
    }

    /// Whether the node knows a block with this hash.
    pub async fn has_block(&self, hash: &str) -> bool {
        self.cmd("getblock", json!([hash])).await.is_ok()
    }

    /// Polls the node until it answers or `timeout` elapses.
    pub async fn wait_online(
        &self,
        timeout: Duration,
        backoff: Duration,
        cancel: &CancellationToken,
    ) -> Result {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.is_online().await {
                info!("Node daemon is online");
                return Ok(());
            }

            ensure!(
                tokio::time::Instant::now() < deadline,
                "daemon start failed: node did not come online within {}s",
                timeout.as_secs()
            );

            warn!("Node daemon offline, retrying in {}s", backoff.as_secs_f64());

            tokio::select! {
                _ = cancel.cancelled() => bail!("cancelled while waiting for node daemon"),
                _ = sleep(backoff) => {}
            }
        }
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Value,
}

/// JSON-RPC 1.0 over HTTP.
pub struct RpcDaemon {
    client: reqwest::Client,
    url: Url,
    user: Option<String>,
    password: Option<String>,
    id: AtomicU64,
}

impl RpcDaemon {
    pub fn new(url: Url, user: Option<String>, password: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            url,
            user,
            password,
            id: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl Daemon for RpcDaemon {
    async fn cmd(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.id.fetch_add(1, Ordering::Relaxed);

        let mut request = self.client.post(self.url.clone()).json(&json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        }));

        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_ref());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("`{method}` request to {} failed", self.url))?;

        let status = response.status();

        let body = response
            .json::<RpcResponse>()
            .await
            .with_context(|| format!("`{method}` returned HTTP {status} without a JSON body"))?;

        if !body.error.is_null() {
            bail!("`{method}` failed: {}", body.error);
        }

        Ok(body.result)
    }
}
