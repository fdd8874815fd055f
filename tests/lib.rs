use {
    async_trait::async_trait,
    parking_lot::Mutex,
    pretty_assertions::assert_eq as pretty_assert_eq,
    serde_json::{Value, json},
    shaft::{
        BlockNotifyOptions, Pool, Settings, daemon::Daemon, options::Options,
        settings::PortOptions,
    },
    std::{
        collections::HashMap,
        net::{IpAddr, SocketAddr},
        sync::Arc,
        time::{Duration, SystemTime, UNIX_EPOCH},
    },
    tempfile::TempDir,
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
        net::{
            TcpStream,
            tcp::{OwnedReadHalf, OwnedWriteHalf},
        },
        time::timeout,
    },
    tokio_util::sync::CancellationToken,
};

mod pool;

const ADDRESS: &str = "mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn";
const NOTIFY_PASSWORD: &str = "hunter2";

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn template(previous_block_hash: &str, height: u64, bits: &str) -> Value {
    json!({
        "bits": bits,
        "previousblockhash": previous_block_hash,
        "curtime": unix_time() - 60,
        "height": height,
        "version": 0x20000000,
        "transactions": [],
        "coinbasevalue": 5_000_000_000u64,
        "coinbaseaux": {"flags": ""},
    })
}

/// A node that answers from a table and remembers every call.
#[derive(Default)]
struct MockNode {
    responses: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockNode {
    fn new(bits: &str) -> Arc<Self> {
        let node = Arc::new(Self::default());
        node.respond("getblockchaininfo", json!({"chain": "regtest"}));
        node.respond("validateaddress", json!({"isvalid": true}));
        node.respond("getblocktemplate", template(&"11".repeat(32), 101, bits));
        node.respond("submitblock", Value::Null);
        node.respond("getblock", json!({"confirmations": 1}));
        node
    }

    fn respond(&self, method: &str, response: Value) {
        self.responses.lock().insert(method.into(), response);
    }

    fn calls(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(name, _)| name == method)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

#[async_trait]
impl Daemon for MockNode {
    async fn cmd(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        self.calls.lock().push((method.into(), params));

        self.responses
            .lock()
            .get(method)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("method not found: {method}"))
    }
}

struct TestPool {
    pool: Pool,
    node: Arc<MockNode>,
    cancel: CancellationToken,
    tempdir: TempDir,
}

impl TestPool {
    async fn start(bits: &str) -> Self {
        Self::start_with(bits, |_| {}).await
    }

    async fn start_with(bits: &str, configure: impl FnOnce(&mut Settings)) -> Self {
        let tempdir = TempDir::new().unwrap();

        let mut settings = Settings::from_options(&Options {
            address: Some(ADDRESS.into()),
            listen: Some(IpAddr::from([127, 0, 0, 1])),
            events_file: Some(tempdir.path().join("events.jsonl")),
            ..Default::default()
        });

        settings.ports = Some(vec![PortOptions {
            port: 0,
            difficulty: 1e-12,
            vardiff: None,
        }]);
        settings.block_notify = Some(BlockNotifyOptions {
            enabled: true,
            address: IpAddr::from([127, 0, 0, 1]),
            port: 0,
            password: NOTIFY_PASSWORD.into(),
        });
        settings.block_refresh_interval = Some(60.0);

        configure(&mut settings);

        let node = MockNode::new(bits);
        let cancel = CancellationToken::new();

        let pool = Pool::start(&settings, node.clone(), cancel.clone())
            .await
            .unwrap();

        Self {
            pool,
            node,
            cancel,
            tempdir,
        }
    }

    fn stratum_address(&self) -> SocketAddr {
        self.pool.stratum_addresses()[0]
    }

    async fn connect(&self) -> Miner {
        Miner::connect(self.stratum_address()).await
    }

    async fn notify_block(&self, block_hash: &str, password: &str) {
        let mut stream = TcpStream::connect(self.pool.block_notify_address().unwrap())
            .await
            .unwrap();

        let line = json!({"password": password, "blockHash": block_hash}).to_string();
        stream.write_all(line.as_bytes()).await.unwrap();
        stream.write_all(b"\n").await.unwrap();
        stream.shutdown().await.unwrap();
    }

    /// Shuts the pool down and returns the recorded events.
    async fn stop(self) -> Vec<Value> {
        self.cancel.cancel();
        timeout(Duration::from_secs(5), self.pool.wait())
            .await
            .unwrap();

        std::fs::read_to_string(self.tempdir.path().join("events.jsonl"))
            .unwrap_or_default()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

/// A stratum client speaking one JSON object per line.
struct Miner {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Miner {
    async fn connect(address: SocketAddr) -> Self {
        let (reader, writer) = TcpStream::connect(address).await.unwrap().into_split();

        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn write(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    /// Sends a request and returns its reply. Pushes that arrive first are
    /// dropped.
    async fn request(&mut self, id: u64, method: &str, params: Value) -> Value {
        self.write(&json!({"id": id, "method": method, "params": params}).to_string())
            .await;

        loop {
            let message = self.read().await;
            if message["id"] == id {
                return message;
            }
        }
    }

    async fn read(&mut self) -> Value {
        let line = timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        serde_json::from_str(&line).unwrap()
    }

    /// Reads until the pool pushes `method`, skipping anything else.
    async fn wait_for(&mut self, method: &str) -> Value {
        loop {
            let message = self.read().await;
            if message["method"] == method {
                return message;
            }
        }
    }

    async fn closed(mut self) {
        loop {
            let next = timeout(Duration::from_secs(5), self.lines.next_line())
                .await
                .unwrap();

            match next {
                Ok(None) | Err(_) => return,
                Ok(Some(_)) => {}
            }
        }
    }

    /// Subscribes and authorizes. Returns the first job pushed.
    async fn activate(&mut self, worker: &str) -> Value {
        let subscribed = self
            .request(1, "mining.subscribe", json!(["cpuminer/2.5"]))
            .await;
        assert_eq!(subscribed["error"], Value::Null);

        let difficulty = self.read().await;
        pretty_assert_eq!(difficulty["method"], "mining.set_difficulty");

        let notify = self.read().await;
        pretty_assert_eq!(notify["method"], "mining.notify");

        let authorized = self
            .request(2, "mining.authorize", json!([worker, "x"]))
            .await;
        pretty_assert_eq!(authorized["result"], true);

        notify
    }

    async fn submit(&mut self, id: u64, worker: &str, notify: &Value, nonce: u32) -> Value {
        self.request(
            id,
            "mining.submit",
            json!([
                worker,
                notify["params"][0],
                "00000000",
                notify["params"][7],
                format!("{nonce:08x}"),
            ]),
        )
        .await
    }
}
