use {super::*, options::Options, std::collections::BTreeMap};

const DEFAULT_PORT: u16 = 3333;
const DEFAULT_DIFFICULTY: f64 = 32.0;

fn default_difficulty() -> f64 {
    DEFAULT_DIFFICULTY
}

/// One stratum listen port.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PortOptions {
    pub port: u16,
    #[serde(default = "default_difficulty")]
    pub difficulty: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vardiff: Option<VardiffOptions>,
}

impl Default for PortOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            difficulty: DEFAULT_DIFFICULTY,
            vardiff: None,
        }
    }
}

/// A fee output, before its address is resolved to a script.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RecipientOptions {
    pub address: String,
    pub percent: f64,
}

/// TOML config file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub address: Option<String>,
    pub listen: Option<IpAddr>,
    pub instance_id: Option<u32>,
    pub events_file: Option<PathBuf>,
    pub emit_invalid_block_hashes: Option<bool>,
    pub validate_worker_username: Option<bool>,
    pub block_refresh_interval: Option<f64>,
    pub job_rebroadcast_timeout: Option<u64>,
    pub connection_timeout: Option<u64>,

    pub coin: Option<CoinSection>,
    pub daemon: Option<DaemonSection>,
    pub recipients: Option<Vec<RecipientOptions>>,
    pub ports: Option<Vec<PortOptions>>,
    pub banning: Option<BanningOptions>,
    pub block_notify: Option<BlockNotifyOptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoinSection {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub algorithm: Option<Algorithm>,
    pub reward: Option<RewardKind>,
    pub tx_messages: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonSection {
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub startup_timeout: Option<u64>,
    pub retry_interval: Option<u64>,
}

/// Resolved configuration. Every field is optional until `or_defaults`
/// fills in what no source provided.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Settings {
    pub config: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,

    pub coin_name: Option<String>,
    pub coin_symbol: Option<String>,
    pub algorithm: Option<Algorithm>,
    pub reward: Option<RewardKind>,
    pub tx_messages: Option<bool>,

    pub address: Option<String>,
    pub recipients: Option<Vec<RecipientOptions>>,

    pub daemon_url: Option<String>,
    pub daemon_user: Option<String>,
    #[serde(skip_serializing)]
    pub daemon_password: Option<String>,
    pub daemon_startup_timeout: Option<u64>,
    pub daemon_retry_interval: Option<u64>,

    pub listen: Option<IpAddr>,
    pub ports: Option<Vec<PortOptions>>,
    pub banning: Option<BanningOptions>,
    pub block_refresh_interval: Option<f64>,
    pub job_rebroadcast_timeout: Option<u64>,
    pub connection_timeout: Option<u64>,
    pub instance_id: Option<u32>,
    #[serde(skip_serializing)]
    pub block_notify: Option<BlockNotifyOptions>,
    pub events_file: Option<PathBuf>,
    pub emit_invalid_block_hashes: Option<bool>,
    pub validate_worker_username: Option<bool>,
}

impl Settings {
    /// Load settings from all sources with proper priority
    pub fn load(options: Options) -> Result<Self> {
        let mut env = BTreeMap::<String, String>::new();

        for (var, value) in std::env::vars_os() {
            let Some(var) = var.to_str() else {
                continue;
            };

            let Some(key) = var.strip_prefix("SHAFT_") else {
                continue;
            };

            env.insert(
                key.into(),
                value.into_string().map_err(|value| {
                    anyhow!(
                        "environment variable `{var}` not valid unicode: `{}`",
                        value.to_string_lossy()
                    )
                })?,
            );
        }

        Self::merge(options, env)
    }

    /// Merge all configuration sources
    pub fn merge(options: Options, env: BTreeMap<String, String>) -> Result<Self> {
        let settings = Self::from_options(&options).or(Self::from_env(&env)?);

        let config = match Self::find_config_path(&settings) {
            Some(path) => Self::read_config(&path)?,
            None => Config::default(),
        };

        let settings = settings.or(Self::from_config(&config)).or_defaults();

        settings.validate()?;

        Ok(settings)
    }

    fn read_config(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to open config file `{}`", path.display()))?;

        toml::from_str(&text)
            .with_context(|| format!("failed to deserialize config file `{}`", path.display()))
    }

    fn find_config_path(settings: &Self) -> Option<PathBuf> {
        if let Some(path) = &settings.config {
            return Some(path.clone());
        }

        if let Some(dir) = &settings.config_dir {
            let path = dir.join("shaft.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::config_dir()
            .map(|dir| dir.join("shaft").join("shaft.toml"))
            .filter(|path| path.exists())
    }

    pub fn from_options(options: &Options) -> Self {
        Self {
            config: options.config.clone(),
            config_dir: options.config_dir.clone(),
            algorithm: options.algorithm,
            address: options.address.clone(),
            daemon_url: options.daemon_url.clone(),
            daemon_user: options.daemon_user.clone(),
            daemon_password: options.daemon_password.clone(),
            listen: options.listen,
            instance_id: options.instance_id,
            events_file: options.events_file.clone(),
            ..Default::default()
        }
    }

    pub fn from_env(env: &BTreeMap<String, String>) -> Result<Self> {
        fn parse<T: FromStr>(env: &BTreeMap<String, String>, key: &str) -> Result<Option<T>>
        where
            T::Err: Display,
        {
            env.get(key)
                .map(|value| {
                    value.parse::<T>().map_err(|err| {
                        anyhow!("failed to parse environment variable SHAFT_{key}: {err}")
                    })
                })
                .transpose()
        }

        let get_bool = |key: &str| {
            env.get(key)
                .map(|value| !value.is_empty() && value != "0" && value.to_lowercase() != "false")
        };

        let get_string = |key: &str| env.get(key).cloned();

        let get_path = |key: &str| env.get(key).map(PathBuf::from);

        let reward = env
            .get("REWARD")
            .map(|value| <RewardKind as ValueEnum>::from_str(value, true))
            .transpose()
            .map_err(|err| anyhow!("failed to parse environment variable SHAFT_REWARD: {err}"))?;

        Ok(Self {
            config: get_path("CONFIG"),
            config_dir: get_path("CONFIG_DIR"),

            coin_name: get_string("COIN_NAME"),
            coin_symbol: get_string("COIN_SYMBOL"),
            algorithm: parse(env, "ALGORITHM")?,
            reward,
            tx_messages: get_bool("TX_MESSAGES"),

            address: get_string("ADDRESS"),
            recipients: None,

            daemon_url: get_string("DAEMON_URL"),
            daemon_user: get_string("DAEMON_USER"),
            daemon_password: get_string("DAEMON_PASSWORD"),
            daemon_startup_timeout: parse(env, "DAEMON_STARTUP_TIMEOUT")?,
            daemon_retry_interval: parse(env, "DAEMON_RETRY_INTERVAL")?,

            listen: parse(env, "LISTEN")?,
            ports: None,
            banning: None,
            block_refresh_interval: parse(env, "BLOCK_REFRESH_INTERVAL")?,
            job_rebroadcast_timeout: parse(env, "JOB_REBROADCAST_TIMEOUT")?,
            connection_timeout: parse(env, "CONNECTION_TIMEOUT")?,
            instance_id: parse(env, "INSTANCE_ID")?,
            block_notify: None,
            events_file: get_path("EVENTS_FILE"),
            emit_invalid_block_hashes: get_bool("EMIT_INVALID_BLOCK_HASHES"),
            validate_worker_username: get_bool("VALIDATE_WORKER_USERNAME"),
        })
    }

    pub fn from_config(config: &Config) -> Self {
        let coin = config.coin.as_ref();
        let daemon = config.daemon.as_ref();

        Self {
            config: None,
            config_dir: None,

            coin_name: coin.and_then(|c| c.name.clone()),
            coin_symbol: coin.and_then(|c| c.symbol.clone()),
            algorithm: coin.and_then(|c| c.algorithm),
            reward: coin.and_then(|c| c.reward),
            tx_messages: coin.and_then(|c| c.tx_messages),

            address: config.address.clone(),
            recipients: config.recipients.clone(),

            daemon_url: daemon.and_then(|d| d.url.clone()),
            daemon_user: daemon.and_then(|d| d.user.clone()),
            daemon_password: daemon.and_then(|d| d.password.clone()),
            daemon_startup_timeout: daemon.and_then(|d| d.startup_timeout),
            daemon_retry_interval: daemon.and_then(|d| d.retry_interval),

            listen: config.listen,
            ports: config.ports.clone(),
            banning: config.banning,
            block_refresh_interval: config.block_refresh_interval,
            job_rebroadcast_timeout: config.job_rebroadcast_timeout,
            connection_timeout: config.connection_timeout,
            instance_id: config.instance_id,
            block_notify: config.block_notify.clone(),
            events_file: config.events_file.clone(),
            emit_invalid_block_hashes: config.emit_invalid_block_hashes,
            validate_worker_username: config.validate_worker_username,
        }
    }

    /// Merge self with another Settings, self takes priority
    pub fn or(self, other: Self) -> Self {
        Self {
            config: self.config.or(other.config),
            config_dir: self.config_dir.or(other.config_dir),

            coin_name: self.coin_name.or(other.coin_name),
            coin_symbol: self.coin_symbol.or(other.coin_symbol),
            algorithm: self.algorithm.or(other.algorithm),
            reward: self.reward.or(other.reward),
            tx_messages: self.tx_messages.or(other.tx_messages),

            address: self.address.or(other.address),
            recipients: self.recipients.or(other.recipients),

            daemon_url: self.daemon_url.or(other.daemon_url),
            daemon_user: self.daemon_user.or(other.daemon_user),
            daemon_password: self.daemon_password.or(other.daemon_password),
            daemon_startup_timeout: self
                .daemon_startup_timeout
                .or(other.daemon_startup_timeout),
            daemon_retry_interval: self.daemon_retry_interval.or(other.daemon_retry_interval),

            listen: self.listen.or(other.listen),
            ports: self.ports.or(other.ports),
            banning: self.banning.or(other.banning),
            block_refresh_interval: self.block_refresh_interval.or(other.block_refresh_interval),
            job_rebroadcast_timeout: self
                .job_rebroadcast_timeout
                .or(other.job_rebroadcast_timeout),
            connection_timeout: self.connection_timeout.or(other.connection_timeout),
            instance_id: self.instance_id.or(other.instance_id),
            block_notify: self.block_notify.or(other.block_notify),
            events_file: self.events_file.or(other.events_file),
            emit_invalid_block_hashes: self
                .emit_invalid_block_hashes
                .or(other.emit_invalid_block_hashes),
            validate_worker_username: self
                .validate_worker_username
                .or(other.validate_worker_username),
        }
    }

    fn or_defaults(self) -> Self {
        Self {
            config: self.config,
            config_dir: self.config_dir,

            coin_name: Some(self.coin_name.unwrap_or_else(|| "bitcoin".into())),
            coin_symbol: Some(self.coin_symbol.unwrap_or_else(|| "BTC".into())),
            algorithm: Some(self.algorithm.unwrap_or_default()),
            reward: Some(self.reward.unwrap_or_default()),
            tx_messages: Some(self.tx_messages.unwrap_or(false)),

            address: self.address,
            recipients: Some(self.recipients.unwrap_or_default()),

            daemon_url: Some(
                self.daemon_url
                    .unwrap_or_else(|| "http://127.0.0.1:8332/".into()),
            ),
            daemon_user: self.daemon_user,
            daemon_password: self.daemon_password,
            daemon_startup_timeout: Some(self.daemon_startup_timeout.unwrap_or(60)),
            daemon_retry_interval: Some(self.daemon_retry_interval.unwrap_or(1)),

            listen: Some(
                self.listen
                    .unwrap_or_else(|| IpAddr::from([0, 0, 0, 0])),
            ),
            ports: Some(
                self.ports
                    .filter(|ports| !ports.is_empty())
                    .unwrap_or_else(|| vec![PortOptions::default()]),
            ),
            banning: Some(self.banning.unwrap_or_default()),
            block_refresh_interval: Some(self.block_refresh_interval.unwrap_or(1.0)),
            job_rebroadcast_timeout: Some(self.job_rebroadcast_timeout.unwrap_or(55)),
            connection_timeout: Some(self.connection_timeout.unwrap_or(600)),
            instance_id: self.instance_id,
            block_notify: Some(self.block_notify.unwrap_or_default()),
            events_file: self.events_file,
            emit_invalid_block_hashes: Some(self.emit_invalid_block_hashes.unwrap_or(false)),
            validate_worker_username: Some(self.validate_worker_username.unwrap_or(true)),
        }
    }

    fn validate(&self) -> Result {
        ensure!(
            self.address.as_deref().is_some_and(|a| !a.is_empty()),
            "no pool address configured: set `address` in shaft.toml, SHAFT_ADDRESS or --address"
        );

        match (&self.daemon_user, &self.daemon_password) {
            (None, Some(_)) => bail!("daemon password specified without user"),
            (Some(_), None) => bail!("daemon user specified without password"),
            _ => {}
        }

        self.daemon_url()?;

        let mut total = 0.0;
        for recipient in self.recipients() {
            ensure!(
                recipient.percent > 0.0 && recipient.percent < 100.0,
                "recipient {} percent {} out of range (0, 100)",
                recipient.address,
                recipient.percent
            );
            total += recipient.percent;
        }
        ensure!(
            total < 100.0,
            "recipients take {total}% of the block reward, leaving nothing for the pool"
        );

        let mut seen = HashSet::new();
        for port in self.ports() {
            ensure!(seen.insert(port.port), "port {} configured twice", port.port);
            ensure!(
                port.difficulty.is_finite() && port.difficulty > 0.0,
                "port {} difficulty must be positive",
                port.port
            );
            if let Some(vardiff) = &port.vardiff {
                vardiff
                    .validate()
                    .with_context(|| format!("invalid vardiff for port {}", port.port))?;
            }
        }

        self.banning().validate()?;

        let interval = self.block_refresh_interval.unwrap_or(1.0);
        ensure!(
            interval.is_finite() && interval > 0.0,
            "block_refresh_interval must be positive"
        );

        if let Some(instance_id) = self.instance_id {
            ensure!(
                instance_id < 32,
                "instance_id {instance_id} out of range [0, 32)"
            );
        }

        let notify = self.block_notify();
        ensure!(
            !notify.enabled || !notify.password.is_empty(),
            "block notify listener requires a password"
        );

        Ok(())
    }

    pub fn coin_name(&self) -> &str {
        self.coin_name.as_deref().unwrap_or("bitcoin")
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm.unwrap_or_default()
    }

    pub fn reward(&self) -> RewardKind {
        self.reward.unwrap_or_default()
    }

    pub fn tx_messages(&self) -> bool {
        self.tx_messages.unwrap_or(false)
    }

    pub fn address(&self) -> Result<&str> {
        self.address
            .as_deref()
            .ok_or_else(|| anyhow!("no pool address configured"))
    }

    pub fn recipients(&self) -> &[RecipientOptions] {
        self.recipients.as_deref().unwrap_or_default()
    }

    pub fn daemon_url(&self) -> Result<Url> {
        let url = self.daemon_url.as_deref().unwrap_or("http://127.0.0.1:8332/");
        Url::parse(url).with_context(|| format!("invalid daemon url `{url}`"))
    }

    pub fn daemon(&self) -> Result<RpcDaemon> {
        let url = self.daemon_url()?;

        info!("Connecting to node daemon at {url}");

        RpcDaemon::new(url, self.daemon_user.clone(), self.daemon_password.clone())
    }

    pub fn daemon_startup_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon_startup_timeout.unwrap_or(60))
    }

    pub fn daemon_retry_interval(&self) -> Duration {
        Duration::from_secs(self.daemon_retry_interval.unwrap_or(1).max(1))
    }

    pub fn listen(&self) -> IpAddr {
        self.listen.unwrap_or_else(|| IpAddr::from([0, 0, 0, 0]))
    }

    pub fn ports(&self) -> Vec<PortOptions> {
        self.ports
            .clone()
            .filter(|ports| !ports.is_empty())
            .unwrap_or_else(|| vec![PortOptions::default()])
    }

    pub fn banning(&self) -> BanningOptions {
        self.banning.unwrap_or_default()
    }

    pub fn block_refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(self.block_refresh_interval.unwrap_or(1.0))
    }

    pub fn job_rebroadcast_timeout(&self) -> Duration {
        Duration::from_secs(self.job_rebroadcast_timeout.unwrap_or(55))
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout.unwrap_or(600))
    }

    pub fn instance_id(&self) -> Option<u32> {
        self.instance_id
    }

    pub fn block_notify(&self) -> BlockNotifyOptions {
        self.block_notify.clone().unwrap_or_default()
    }

    pub fn events_file(&self) -> Option<&Path> {
        self.events_file.as_deref()
    }

    pub fn emit_invalid_block_hashes(&self) -> bool {
        self.emit_invalid_block_hashes.unwrap_or(false)
    }

    pub fn validate_worker_username(&self) -> bool {
        self.validate_worker_username.unwrap_or(true)
    }
}
