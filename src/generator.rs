use {super::*, server::Server};

/// Keeps jobs in step with the node: polls for templates, reacts to block
/// notifications and rebroadcasts when the tip goes quiet.
pub(crate) struct Generator {
    pub(crate) daemon: Arc<dyn Daemon>,
    pub(crate) job_manager: Arc<JobManager>,
    pub(crate) server: Arc<Server>,
    pub(crate) block_refresh_interval: Duration,
    pub(crate) job_rebroadcast_timeout: Duration,
}

impl Generator {
    pub(crate) fn spawn(
        self,
        mut refresh: mpsc::Receiver<()>,
        cancel: CancellationToken,
        tasks: &mut JoinSet<()>,
    ) {
        info!("Spawning generator task");

        tasks.spawn(async move {
            let mut ticker = interval(self.block_refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            let rebroadcast = sleep(self.job_rebroadcast_timeout);
            tokio::pin!(rebroadcast);

            loop {
                let result = tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.poll().await,
                    Some(()) = refresh.recv() => {
                        debug!("Template refresh requested");
                        self.poll().await
                    }
                    _ = &mut rebroadcast => self.rebroadcast().await,
                };

                let broadcast = result.unwrap_or_else(|err| {
                    warn!("Failed to refresh block template: {err}");
                    false
                });

                if broadcast || rebroadcast.is_elapsed() {
                    rebroadcast
                        .as_mut()
                        .reset(tokio::time::Instant::now() + self.job_rebroadcast_timeout);
                }
            }

            info!("Shutting down generator");
        });
    }

    /// Fetches a template and broadcasts a job if it starts a new block.
    async fn poll(&self) -> Result<bool> {
        let rpc = self.daemon.get_block_template().await?;

        if !self.job_manager.new_template(rpc)? {
            return Ok(false);
        }

        self.broadcast_current();

        Ok(true)
    }

    /// Issues a fresh job on the current tip so miners see new transactions
    /// and a newer timestamp.
    async fn rebroadcast(&self) -> Result<bool> {
        let rpc = self.daemon.get_block_template().await?;

        let same_tip = self
            .job_manager
            .current_job()
            .is_some_and(|job| job.rpc().previous_block_hash == rpc.previous_block_hash);

        if !same_tip {
            if self.job_manager.new_template(rpc)? {
                self.broadcast_current();
                return Ok(true);
            }

            return Ok(false);
        }

        let job = self.job_manager.update_current_job(rpc)?;

        info!(
            "No new block for {}s, rebroadcasting job {}",
            self.job_rebroadcast_timeout.as_secs(),
            job.job_id()
        );

        self.server.broadcast(&job);

        Ok(true)
    }

    fn broadcast_current(&self) {
        if let Some(job) = self.job_manager.current_job() {
            let sessions = self.server.broadcast(&job);
            info!("Broadcast job {} to {sessions} sessions", job.job_id());
        }
    }
}
