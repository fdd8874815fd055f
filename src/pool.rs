use {
    super::*,
    block_submitter::{BlockSubmitter, block_channel},
    generator::Generator,
    server::Server,
    settings::Settings,
    stratifier::SessionContext,
};

/// A running pool: listeners bound, jobs flowing.
pub struct Pool {
    stratum: Vec<SocketAddr>,
    block_notify: Option<SocketAddr>,
    job_manager: Arc<JobManager>,
    metatron: Arc<Metatron>,
    tasks: JoinSet<()>,
}

impl Pool {
    /// Brings the pool up against `daemon`. Any failure before the listeners
    /// are bound is fatal.
    pub async fn start(
        settings: &Settings,
        daemon: Arc<dyn Daemon>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        daemon
            .wait_online(
                settings.daemon_startup_timeout(),
                settings.daemon_retry_interval(),
                &cancel,
            )
            .await?;

        let coinbase = coinbase_config(settings, &daemon).await?;

        let instance_id = settings.instance_id().unwrap_or_else(random_instance_id);

        let job_manager = Arc::new(
            JobManager::new(Pow::new(settings.algorithm())?, coinbase, instance_id)
                .with_invalid_block_hashes(settings.emit_invalid_block_hashes()),
        );

        let template = daemon
            .get_block_template()
            .await
            .context("failed to fetch initial block template")?;

        job_manager.new_template(template)?;

        if let Some(job) = job_manager.current_job() {
            info!(
                "Initial job {} at height {} with network difficulty {}",
                job.job_id(),
                job.height(),
                job_manager.network_difficulty()
            );
        }

        let mut tasks = JoinSet::new();

        let events = build_event_sink(settings.events_file(), cancel.clone(), &mut tasks).await?;

        let metatron = Arc::new(Metatron::new(settings.algorithm()));
        metatron.clone().spawn(cancel.clone(), &mut tasks);

        let authorizer: Arc<dyn Authorizer> = if settings.validate_worker_username() {
            Arc::new(AddressAuthorizer::new(daemon.clone()))
        } else {
            Arc::new(AcceptAll)
        };

        let (blocks, blocks_rx) = block_channel();
        let (refresh, refresh_rx) = mpsc::channel(1);

        let bans = Arc::new(Bans::default());
        let banning = settings.banning();

        let server = Server::new(Arc::new(SessionContext {
            job_manager: job_manager.clone(),
            authorizer,
            events: events.clone(),
            blocks,
            metatron: metatron.clone(),
            bans: bans.clone(),
            banning,
            connection_timeout: settings.connection_timeout(),
        }));

        let mut stratum = Vec::new();
        for port in settings.ports() {
            stratum.push(
                server
                    .listen(settings.listen(), port, cancel.clone(), &mut tasks)
                    .await?,
            );
        }

        Generator {
            daemon: daemon.clone(),
            job_manager: job_manager.clone(),
            server,
            block_refresh_interval: settings.block_refresh_interval(),
            job_rebroadcast_timeout: settings.job_rebroadcast_timeout(),
        }
        .spawn(refresh_rx, cancel.clone(), &mut tasks);

        BlockSubmitter {
            daemon,
            events,
            metatron: metatron.clone(),
            refresh: refresh.clone(),
        }
        .spawn(blocks_rx, cancel.clone(), &mut tasks);

        let notify = settings.block_notify();
        let block_notify = if notify.enabled {
            Some(block_notify::spawn_listener(&notify, refresh, cancel.clone(), &mut tasks).await?)
        } else {
            None
        };

        if banning.enabled {
            bans.spawn_purge(banning, cancel, &mut tasks);
        }

        info!(
            "Pool started for {} ({}) with instance id {instance_id}",
            settings.coin_name(),
            settings.algorithm()
        );

        Ok(Self {
            stratum,
            block_notify,
            job_manager,
            metatron,
            tasks,
        })
    }

    /// Bound stratum addresses, in configuration order.
    pub fn stratum_addresses(&self) -> &[SocketAddr] {
        &self.stratum
    }

    pub fn block_notify_address(&self) -> Option<SocketAddr> {
        self.block_notify
    }

    pub fn job_manager(&self) -> &Arc<JobManager> {
        &self.job_manager
    }

    pub fn metatron(&self) -> &Arc<Metatron> {
        &self.metatron
    }

    /// Waits for every task to finish after cancellation.
    pub async fn wait(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(err) = result {
                error!("Pool task failed: {err}");
            }
        }

        info!("{}", self.metatron.status_line());
    }
}

async fn coinbase_config(settings: &Settings, daemon: &Arc<dyn Daemon>) -> Result<CoinbaseConfig> {
    let address = settings.address()?;

    let validated = daemon
        .validate_address(address)
        .await
        .with_context(|| format!("failed to validate pool address `{address}`"))?;

    ensure!(
        validated.isvalid,
        "pool address `{address}` is not valid for the node"
    );

    let reward = settings.reward();

    let pool_script = match reward {
        RewardKind::Pow => util::address_to_script(address)?,
        RewardKind::Pos => {
            let pubkey = validated
                .pubkey
                .ok_or_else(|| anyhow!("node returned no pubkey for pool address `{address}`"))?;
            util::pubkey_to_script(&pubkey)?
        }
    };

    let recipients = settings
        .recipients()
        .iter()
        .map(|recipient| {
            Ok(Recipient {
                script: util::address_to_script(&recipient.address)
                    .with_context(|| format!("invalid recipient address `{}`", recipient.address))?,
                percent: recipient.percent,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CoinbaseConfig {
        pool_script,
        recipients,
        reward,
        tx_message: settings
            .tx_messages()
            .then(|| format!("{POOL_TAG} {}", settings.coin_name())),
        ..CoinbaseConfig::new(ScriptBuf::new())
    })
}
