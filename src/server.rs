use {super::*, stratifier::SessionContext};

const JOB_CHANNEL_CAPACITY: usize = 8;

/// Issues subscription ids: a fixed prefix no miner would send followed by
/// the little-endian hex of a counter.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionCounter {
    count: AtomicU64,
}

impl SubscriptionCounter {
    pub(crate) fn next(&self) -> String {
        let count = self.count.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        format!("{SUBSCRIPTION_PREFIX}{}", hex::encode(count.to_le_bytes()))
    }
}

/// Accepts miners on every configured port and fans jobs out to them.
pub(crate) struct Server {
    context: Arc<SessionContext>,
    sessions: DashMap<String, mpsc::Sender<Arc<BlockTemplate>>>,
    subscriptions: SubscriptionCounter,
}

impl Server {
    pub(crate) fn new(context: Arc<SessionContext>) -> Arc<Self> {
        Arc::new(Self {
            context,
            sessions: DashMap::new(),
            subscriptions: SubscriptionCounter::default(),
        })
    }

    /// Binds `address:port` and spawns its accept loop. Returns the bound
    /// address, which differs from the configured one for port 0.
    pub(crate) async fn listen(
        self: &Arc<Self>,
        address: IpAddr,
        port: PortOptions,
        cancel: CancellationToken,
        tasks: &mut JoinSet<()>,
    ) -> Result<SocketAddr> {
        let listener = TcpListener::bind((address, port.port))
            .await
            .with_context(|| format!("failed to bind stratum port {address}:{}", port.port))?;

        let local = listener.local_addr()?;

        info!(
            "Stratum server listening on {local} at difficulty {}",
            port.difficulty
        );

        let server = self.clone();

        tasks.spawn(async move {
            let mut sessions = JoinSet::new();

            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, remote)) => {
                            server.accept(
                                stream,
                                remote,
                                port,
                                cancel.child_token(),
                                &mut sessions,
                            );
                        }
                        Err(err) => warn!("Failed to accept connection on {local}: {err}"),
                    },
                    Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
                    _ = cancel.cancelled() => break,
                }
            }

            while sessions.join_next().await.is_some() {}

            info!("Stopped listening on {local}");
        });

        Ok(local)
    }

    fn accept(
        self: &Arc<Self>,
        stream: TcpStream,
        remote: SocketAddr,
        port: PortOptions,
        cancel: CancellationToken,
        sessions: &mut JoinSet<()>,
    ) {
        let banning = self.context.banning;

        if banning.enabled
            && self
                .context
                .bans
                .is_banned(remote.ip(), banning.ban_duration())
        {
            info!("Refusing connection from banned {remote}");
            return;
        }

        if let Err(err) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {remote}: {err}");
        }

        let subscription_id = self.subscriptions.next();
        let (tx, rx) = mpsc::channel(JOB_CHANNEL_CAPACITY);

        self.sessions.insert(subscription_id.clone(), tx);
        self.context.metatron.add_session();

        info!("Accepted connection from {remote}");

        let server = self.clone();

        sessions.spawn(async move {
            let (reader, writer) = stream.into_split();

            let mut stratifier = Stratifier::new(
                server.context.clone(),
                port,
                remote,
                subscription_id.clone(),
                reader,
                writer,
                rx,
                cancel,
            );

            if let Err(err) = stratifier.serve().await {
                warn!("Session error for {remote}: {err}");
            }

            server.sessions.remove(&subscription_id);
            server.context.metatron.sub_session();
        });
    }

    /// Queues `job` for every live session. Sessions too slow to keep up
    /// skip it; sessions that have gone away are forgotten.
    pub(crate) fn broadcast(&self, job: &Arc<BlockTemplate>) -> usize {
        self.sessions.retain(|id, tx| match tx.try_send(job.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Session {id} is not keeping up, skipping job {}", job.job_id());
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        let sessions = self.sessions.len();

        debug!("Broadcast job {} to {sessions} sessions", job.job_id());

        sessions
    }

    #[cfg(test)]
    fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
