use {
    super::*,
    bans::ShareTally,
    state::{State, Subscription},
};

mod bans;
mod state;

pub use bans::{BanningOptions, Bans};

/// Everything a session shares with the rest of the pool.
pub(crate) struct SessionContext {
    pub(crate) job_manager: Arc<JobManager>,
    pub(crate) authorizer: Arc<dyn Authorizer>,
    pub(crate) events: EventSender,
    pub(crate) blocks: mpsc::Sender<BlockCandidate>,
    pub(crate) metatron: Arc<Metatron>,
    pub(crate) bans: Arc<Bans>,
    pub(crate) banning: BanningOptions,
    pub(crate) connection_timeout: Duration,
}

/// One miner connection. Lines are handled strictly in order and jobs from
/// the server are interleaved between them.
pub(crate) struct Stratifier<R, W> {
    context: Arc<SessionContext>,
    port: PortOptions,
    remote: SocketAddr,
    subscription_id: String,
    reader: FramedRead<R, LinesCodec>,
    writer: FramedWrite<W, LinesCodec>,
    jobs: mpsc::Receiver<Arc<BlockTemplate>>,
    cancel: CancellationToken,
    state: State,
    difficulty: f64,
    previous_difficulty: Option<f64>,
    pending_difficulty: Option<f64>,
    vardiff: Option<Vardiff>,
    tally: ShareTally,
    last_activity: Instant,
}

impl<R, W> Stratifier<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        context: Arc<SessionContext>,
        port: PortOptions,
        remote: SocketAddr,
        subscription_id: String,
        reader: R,
        writer: W,
        jobs: mpsc::Receiver<Arc<BlockTemplate>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            context,
            remote,
            subscription_id,
            reader: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE)),
            writer: FramedWrite::new(writer, LinesCodec::new()),
            jobs,
            cancel,
            state: State::new(),
            difficulty: port.difficulty,
            previous_difficulty: None,
            pending_difficulty: None,
            vardiff: port.vardiff.map(Vardiff::new),
            tally: ShareTally::default(),
            last_activity: Instant::now(),
            port,
        }
    }

    pub(crate) async fn serve(&mut self) -> Result {
        loop {
            let flow = tokio::select! {
                _ = self.cancel.cancelled() => break,
                line = self.reader.next() => {
                    let line = match line {
                        Some(Ok(line)) => line,
                        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                            warn!("Flood from {}, closing connection", self.remote);
                            break;
                        }
                        Some(Err(LinesCodecError::Io(err))) => {
                            debug!("Read error from {}: {err}", self.remote);
                            break;
                        }
                        None => {
                            info!("Worker {} disconnected", self.remote);
                            break;
                        }
                    };

                    self.last_activity = Instant::now();

                    if line.trim().is_empty() {
                        continue;
                    }

                    match serde_json::from_str::<Message>(&line) {
                        Ok(message) => self.handle(message).await?,
                        Err(err) => {
                            warn!("Malformed message from {}: {err}; line={line:?}", self.remote);
                            break;
                        }
                    }
                }
                job = self.jobs.recv() => {
                    let Some(job) = job else {
                        break;
                    };

                    self.on_job(job).await?
                }
            };

            if flow.is_break() {
                break;
            }
        }

        Ok(())
    }

    async fn handle(&mut self, message: Message) -> Result<ControlFlow<()>> {
        let Message::Request { id, method, params } = message else {
            warn!(?message, "Ignoring notification or response from {}", self.remote);
            return Ok(ControlFlow::Continue(()));
        };

        match method.as_str() {
            "mining.subscribe" => {
                debug!("SUBSCRIBE from {} with {params}", self.remote);
                self.subscribe(id, params).await
            }
            "mining.authorize" => {
                debug!("AUTHORIZE from {} with {params}", self.remote);
                self.authorize(id, params).await
            }
            "mining.submit" => {
                debug!("SUBMIT from {} with {params}", self.remote);
                self.submit(id, params).await
            }
            "mining.get_transactions" => {
                self.send_error(id, StratumError::other("transactions are not shared"))
                    .await?;
                Ok(ControlFlow::Continue(()))
            }
            "mining.extranonce.subscribe" => {
                self.send(Message::response(id, json!(false))).await?;
                Ok(ControlFlow::Continue(()))
            }
            method => {
                warn!("UNKNOWN method {method} with {params} from {}", self.remote);

                self.context
                    .events
                    .emit(Event::UnknownMethod(UnknownMethodEvent {
                        timestamp: None,
                        ip: self.remote.ip().to_string(),
                        port: self.port.port,
                        worker: self.state.worker().map(str::to_owned),
                        method: method.into(),
                    }));

                Ok(ControlFlow::Continue(()))
            }
        }
    }

    async fn subscribe(&mut self, id: Id, params: Value) -> Result<ControlFlow<()>> {
        let Ok(subscribe) = serde_json::from_value::<Subscribe>(params) else {
            self.send_error(id, StratumError::other("invalid subscribe params"))
                .await?;
            return Ok(ControlFlow::Continue(()));
        };

        if self.state.subscription().is_some() {
            self.send_error(id, StratumError::other("already subscribed"))
                .await?;
            return Ok(ControlFlow::Continue(()));
        }

        let job_manager = self.context.job_manager.clone();

        let extranonce1 = job_manager.extranonce1();

        let result = SubscribeResult {
            subscription: ("mining.notify".into(), self.subscription_id.clone()),
            extranonce1: extranonce1.clone(),
            extranonce2_size: job_manager.extranonce2_size(),
        };

        self.send(Message::response(id, serde_json::to_value(&result)?))
            .await?;

        info!(
            "Subscribed {} with extranonce1 {extranonce1} ({})",
            self.remote,
            subscribe.user_agent.as_deref().unwrap_or("unknown agent")
        );

        self.state.subscribe(Subscription {
            extranonce1,
            user_agent: subscribe.user_agent,
        });

        self.send_difficulty().await?;

        if let Some(job) = job_manager.current_job() {
            self.send_job(&job).await?;
        }

        Ok(ControlFlow::Continue(()))
    }

    async fn authorize(&mut self, id: Id, params: Value) -> Result<ControlFlow<()>> {
        let Ok(authorize) = serde_json::from_value::<Authorize>(params) else {
            self.send_error(id, StratumError::other("invalid authorize params"))
                .await?;
            return Ok(ControlFlow::Continue(()));
        };

        let authorization = self
            .context
            .authorizer
            .authorize(
                self.remote,
                &authorize.username,
                authorize.password.as_deref(),
            )
            .await;

        self.state.authorize(
            authorization
                .authorized
                .then(|| authorize.username.clone()),
        );

        self.send(Message::Response {
            id,
            result: Some(json!(authorization.authorized)),
            error: authorization
                .error
                .clone()
                .map(|message| StratumError::other(message).into_response()),
        })
        .await?;

        if authorization.authorized {
            info!("Authorized {} as {}", self.remote, authorize.username);
        } else {
            info!(
                "Refused {} as {}: {}",
                self.remote,
                authorize.username,
                authorization.error.as_deref().unwrap_or("unauthorized")
            );
        }

        if authorization.disconnect {
            return Ok(ControlFlow::Break(()));
        }

        if let Some(difficulty) = authorization.difficulty
            && difficulty > 0.0
        {
            self.previous_difficulty = Some(self.difficulty);
            self.difficulty = difficulty;
            self.pending_difficulty = None;

            if self.state.subscription().is_some() {
                self.send_difficulty().await?;
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    async fn submit(&mut self, id: Id, params: Value) -> Result<ControlFlow<()>> {
        let Ok(submit) = serde_json::from_value::<Submit>(params) else {
            self.send_error(id, StratumError::other("invalid submit params"))
                .await?;
            return Ok(ControlFlow::Continue(()));
        };

        let result = match (self.state.worker(), self.state.subscription()) {
            (None, _) => Err(StratumError::Unauthorized),
            (Some(_), None) => Err(StratumError::NotSubscribed),
            (Some(_), Some(subscription)) => {
                self.context
                    .job_manager
                    .process_share(&ShareSubmission {
                        job_id: &submit.job_id,
                        difficulty: self.difficulty,
                        previous_difficulty: self.previous_difficulty,
                        extranonce1: &subscription.extranonce1,
                        extranonce2: &submit.extranonce2,
                        ntime: &submit.ntime,
                        nonce: &submit.nonce,
                    })
            }
        };

        let worker = self
            .state
            .worker()
            .unwrap_or(&submit.username)
            .to_string();

        let valid = match result {
            Ok(share) => {
                self.on_share(&worker, share).await;
                self.send(Message::response(id, json!(true))).await?;
                true
            }
            Err(err) => {
                debug!("Rejected share from {worker} at {}: {err}", self.remote);

                self.context.metatron.reject_share();

                self.context.events.emit(Event::Share(ShareEvent {
                    timestamp: None,
                    job_id: submit.job_id.clone(),
                    ip: self.remote.ip().to_string(),
                    port: self.port.port,
                    worker,
                    height: None,
                    block_reward: None,
                    difficulty: self.difficulty,
                    share_difficulty: match err {
                        StratumError::LowDifficulty { share_difficulty } => Some(share_difficulty),
                        _ => None,
                    },
                    block_difficulty: None,
                    block_hash: None,
                    invalid_block_hash: None,
                    error: Some(err.to_string()),
                }));

                self.send_error(id, err).await?;
                false
            }
        };

        if self.tally.record(valid, &self.context.banning) {
            warn!(
                "Banning {} for {}s: too many invalid shares",
                self.remote.ip(),
                self.context.banning.time
            );
            self.context.bans.ban(self.remote.ip());
            return Ok(ControlFlow::Break(()));
        }

        Ok(ControlFlow::Continue(()))
    }

    async fn on_share(&mut self, worker: &str, share: Share) {
        debug!(
            "Accepted share from {worker} at difficulty {} ({:.4})",
            share.difficulty, share.share_difficulty
        );

        self.context.metatron.accept_share(share.difficulty);

        if let Some(block) = &share.block {
            info!(
                "Block candidate {} at height {} from {worker}",
                block.hash, block.height
            );

            if let Err(err) = self
                .context
                .blocks
                .send(BlockCandidate {
                    block: block.clone(),
                    worker: worker.into(),
                })
                .await
            {
                error!("Block submitter is gone, dropping block {}", err.0.block.hash);
            }
        }

        self.context.events.emit(Event::Share(ShareEvent {
            timestamp: None,
            job_id: share.job_id.to_string(),
            ip: self.remote.ip().to_string(),
            port: self.port.port,
            worker: worker.into(),
            height: Some(share.height),
            block_reward: Some(share.block_reward),
            difficulty: share.difficulty,
            share_difficulty: Some(share.share_difficulty),
            block_difficulty: Some(share.block_difficulty),
            block_hash: share.block.map(|block| block.hash),
            invalid_block_hash: share.invalid_block_hash,
            error: None,
        }));

        let network_difficulty = self.context.job_manager.network_difficulty();

        if let Some(vardiff) = &mut self.vardiff
            && let Some(difficulty) =
                vardiff.record_submit(Instant::now(), self.difficulty, network_difficulty)
        {
            debug!(
                "Queueing difficulty {difficulty} for {worker} (was {})",
                self.difficulty
            );
            self.pending_difficulty = Some(difficulty);
        }
    }

    async fn on_job(&mut self, job: Arc<BlockTemplate>) -> Result<ControlFlow<()>> {
        if self.last_activity.elapsed() > self.context.connection_timeout {
            info!(
                "Closing {} after {}s without activity",
                self.remote,
                self.context.connection_timeout.as_secs()
            );
            return Ok(ControlFlow::Break(()));
        }

        if self.state.subscription().is_none() {
            return Ok(ControlFlow::Continue(()));
        }

        if let Some(difficulty) = self.pending_difficulty.take() {
            self.previous_difficulty = Some(self.difficulty);
            self.difficulty = difficulty;
            self.send_difficulty().await?;
        }

        self.send_job(&job).await?;

        Ok(ControlFlow::Continue(()))
    }

    async fn send_difficulty(&mut self) -> Result {
        self.send(Message::notification(
            "mining.set_difficulty",
            serde_json::to_value(SetDifficulty(self.difficulty))?,
        ))
        .await
    }

    async fn send_job(&mut self, job: &BlockTemplate) -> Result {
        self.send(Message::notification(
            "mining.notify",
            serde_json::to_value(job.job_params())?,
        ))
        .await
    }

    async fn send_error(&mut self, id: Id, error: StratumError) -> Result {
        self.send(Message::error(id, error.into_response())).await
    }

    async fn send(&mut self, message: Message) -> Result {
        let frame = serde_json::to_string(&message)?;
        self.writer.send(frame).await?;
        Ok(())
    }
}
