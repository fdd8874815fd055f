use super::*;

/// Fixed point scale for accumulating fractional difficulty in a u64.
const FIXED_POINT: f64 = 1_000_000.0;

/// Expected hashes per share at difficulty 1.
const HASHES_PER_DIFFICULTY: f64 = 4_294_967_296.0;

const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Pool-wide counters, updated lock-free from every session.
pub struct Metatron {
    sessions: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    blocks: AtomicU64,
    difficulty_scaled: AtomicU64,
    started: Instant,
    multiplier: f64,
}

impl Metatron {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            sessions: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            blocks: AtomicU64::new(0),
            difficulty_scaled: AtomicU64::new(0),
            started: Instant::now(),
            multiplier: algorithm.multiplier() as f64,
        }
    }

    pub fn add_session(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sub_session(&self) {
        self.sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn accept_share(&self, difficulty: f64) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.difficulty_scaled
            .fetch_add((difficulty * FIXED_POINT) as u64, Ordering::Relaxed);
    }

    pub fn reject_share(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_block(&self) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sessions(&self) -> u64 {
        self.sessions.load(Ordering::Relaxed)
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Average hashes per second since startup implied by accepted work.
    pub fn hash_rate(&self) -> f64 {
        let difficulty = self.difficulty_scaled.load(Ordering::Relaxed) as f64 / FIXED_POINT;
        let seconds = self.uptime().as_secs_f64().max(1.0);
        difficulty * HASHES_PER_DIFFICULTY / self.multiplier / seconds
    }

    pub fn status_line(&self) -> String {
        format!(
            "hashrate={}  sessions={}  accepted={}  rejected={}  blocks={}  uptime={}s",
            format_hash_rate(self.hash_rate()),
            self.sessions(),
            self.accepted(),
            self.rejected(),
            self.blocks(),
            self.uptime().as_secs()
        )
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken, tasks: &mut JoinSet<()>) {
        tasks.spawn(async move {
            let mut ticker = interval(STATUS_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => info!("{}", self.status_line()),
                }
            }
        });
    }
}

fn format_hash_rate(rate: f64) -> String {
    const PREFIXES: [&str; 7] = ["", "K", "M", "G", "T", "P", "E"];

    let mut rate = rate;
    let mut prefix = 0;

    while rate >= 1000.0 && prefix < PREFIXES.len() - 1 {
        rate /= 1000.0;
        prefix += 1;
    }

    if prefix == 0 {
        format!("{rate:.0} H/s")
    } else {
        format!("{rate:.2} {}H/s", PREFIXES[prefix])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let metatron = Metatron::new(Algorithm::Sha256d);
        assert_eq!(metatron.sessions(), 0);
        assert_eq!(metatron.accepted(), 0);
        assert_eq!(metatron.rejected(), 0);
        assert_eq!(metatron.blocks(), 0);
        assert_eq!(metatron.hash_rate(), 0.0);
    }

    #[test]
    fn counters() {
        let metatron = Metatron::new(Algorithm::Sha256d);

        metatron.add_session();
        metatron.add_session();
        metatron.sub_session();
        metatron.accept_share(16.0);
        metatron.accept_share(16.0);
        metatron.reject_share();
        metatron.add_block();

        assert_eq!(metatron.sessions(), 1);
        assert_eq!(metatron.accepted(), 2);
        assert_eq!(metatron.rejected(), 1);
        assert_eq!(metatron.blocks(), 1);
        assert!(metatron.hash_rate() > 0.0);
    }

    #[test]
    fn status_line_format_is_stable() {
        let line = Metatron::new(Algorithm::Scrypt).status_line();
        assert!(
            line.starts_with("hashrate=0 H/s  sessions=0  accepted=0  rejected=0  blocks=0  uptime="),
            "unexpected format: {line}"
        );
    }

    #[test]
    fn hash_rate_prefixes() {
        assert_eq!(format_hash_rate(0.0), "0 H/s");
        assert_eq!(format_hash_rate(999.0), "999 H/s");
        assert_eq!(format_hash_rate(1500.0), "1.50 KH/s");
        assert_eq!(format_hash_rate(2.5e12), "2.50 TH/s");
        assert_eq!(format_hash_rate(5e21), "5000.00 EH/s");
    }
}
