use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BanningOptions {
    pub enabled: bool,
    /// Ban length in seconds.
    pub time: u64,
    pub invalid_percent: f64,
    /// Shares to see before judging a session.
    pub check_threshold: u32,
    /// Seconds between sweeps of expired bans.
    pub purge_interval: u64,
}

impl Default for BanningOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            time: 600,
            invalid_percent: 50.0,
            check_threshold: 500,
            purge_interval: 300,
        }
    }
}

impl BanningOptions {
    pub fn validate(&self) -> Result {
        ensure!(
            self.check_threshold > 0,
            "banning check_threshold must be positive"
        );
        ensure!(
            (0.0..=100.0).contains(&self.invalid_percent),
            "banning invalid_percent must be in [0, 100]"
        );
        Ok(())
    }

    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.time)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval.max(1))
    }
}

/// Valid and invalid share counts for one session since its last check.
#[derive(Debug, Default)]
pub(crate) struct ShareTally {
    valid: u32,
    invalid: u32,
}

impl ShareTally {
    /// Counts a share. Returns true when the session should be banned.
    pub(crate) fn record(&mut self, valid: bool, options: &BanningOptions) -> bool {
        if !options.enabled {
            return false;
        }

        if valid {
            self.valid += 1;
        } else {
            self.invalid += 1;
        }

        let total = self.valid + self.invalid;

        if total < options.check_threshold {
            return false;
        }

        let invalid_percent = f64::from(self.invalid) / f64::from(total) * 100.0;

        if invalid_percent >= options.invalid_percent {
            return true;
        }

        *self = Self::default();

        false
    }

    #[cfg(test)]
    fn total(&self) -> u32 {
        self.valid + self.invalid
    }
}

/// Banned addresses and when their bans were issued.
#[derive(Debug, Default)]
pub struct Bans {
    banned: DashMap<IpAddr, Instant>,
}

impl Bans {
    pub fn ban(&self, ip: IpAddr) {
        self.banned.insert(ip, Instant::now());
    }

    /// Whether `ip` is still banned. Expired bans are lifted on lookup.
    pub fn is_banned(&self, ip: IpAddr, duration: Duration) -> bool {
        let Some(banned_at) = self.banned.get(&ip).map(|entry| *entry) else {
            return false;
        };

        if banned_at.elapsed() < duration {
            return true;
        }

        self.banned.remove(&ip);

        false
    }

    pub fn purge(&self, duration: Duration) -> usize {
        let before = self.banned.len();
        self.banned
            .retain(|_, banned_at| banned_at.elapsed() < duration);
        before - self.banned.len()
    }

    /// Sweeps expired bans every `purge_interval` seconds.
    pub(crate) fn spawn_purge(
        self: Arc<Self>,
        options: BanningOptions,
        cancel: CancellationToken,
        tasks: &mut JoinSet<()>,
    ) {
        tasks.spawn(async move {
            let mut ticker = interval(options.purge_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = self.purge(options.ban_duration());
                        if purged > 0 {
                            debug!("Lifted {purged} expired bans, {} remain", self.len());
                        }
                    }
                }
            }
        });
    }

    pub fn len(&self) -> usize {
        self.banned.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.banned.is_empty()
    }
}
