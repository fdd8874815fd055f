use super::*;

/// Worker submission as forwarded by a session. Hex fields are validated here.
#[derive(Debug, Clone, Copy)]
pub struct ShareSubmission<'a> {
    pub job_id: &'a str,
    pub difficulty: f64,
    pub previous_difficulty: Option<f64>,
    pub extranonce1: &'a str,
    pub extranonce2: &'a str,
    pub ntime: &'a str,
    pub nonce: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoundBlock {
    pub hash: String,
    pub hex: String,
    pub height: u64,
}

/// An accepted share.
#[derive(Debug, Clone, PartialEq)]
pub struct Share {
    pub job_id: JobId,
    pub height: u64,
    pub block_reward: u64,
    /// Difficulty the share is credited at.
    pub difficulty: f64,
    pub share_difficulty: f64,
    pub block_difficulty: f64,
    pub block: Option<FoundBlock>,
    pub invalid_block_hash: Option<String>,
}

#[derive(Debug)]
struct Jobs {
    current: Option<Arc<BlockTemplate>>,
    next_id: JobId,
    valid: LruCache<JobId, Arc<BlockTemplate>>,
}

impl Jobs {
    fn new() -> Self {
        Self {
            current: None,
            next_id: JobId::new(0),
            valid: LruCache::new(NonZeroUsize::new(JOB_RETENTION).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    fn next_id(&mut self) -> JobId {
        self.next_id = self.next_id.next();
        self.next_id
    }

    fn insert(&mut self, job: Arc<BlockTemplate>) {
        self.valid.put(job.job_id(), job.clone());
        self.current = Some(job);
    }
}

/// Turns node templates into jobs and validates shares against them.
#[derive(Debug)]
pub struct JobManager {
    pow: Pow,
    coinbase: CoinbaseConfig,
    extranonces: ExtranonceCounter,
    jobs: RwLock<Jobs>,
    network_difficulty: AtomicU64,
    emit_invalid_block_hashes: bool,
}

impl JobManager {
    pub fn new(pow: Pow, coinbase: CoinbaseConfig, instance_id: u32) -> Self {
        Self {
            pow,
            coinbase,
            extranonces: ExtranonceCounter::new(instance_id),
            jobs: RwLock::new(Jobs::new()),
            network_difficulty: AtomicU64::new(0f64.to_bits()),
            emit_invalid_block_hashes: false,
        }
    }

    pub fn with_invalid_block_hashes(mut self, emit: bool) -> Self {
        self.emit_invalid_block_hashes = emit;
        self
    }

    pub fn pow(&self) -> &Pow {
        &self.pow
    }

    pub fn extranonce1(&self) -> String {
        self.extranonces.next()
    }

    pub fn extranonce2_size(&self) -> usize {
        EXTRANONCE2_SIZE
    }

    pub fn current_job(&self) -> Option<Arc<BlockTemplate>> {
        self.jobs.read().current.clone()
    }

    pub fn job(&self, job_id: JobId) -> Option<Arc<BlockTemplate>> {
        self.jobs.read().valid.peek(&job_id).cloned()
    }

    /// Network difficulty of the current job in worker units.
    pub fn network_difficulty(&self) -> f64 {
        f64::from_bits(self.network_difficulty.load(Ordering::Relaxed))
    }

    /// Builds a job for a template with an unseen previous block hash. Returns
    /// false when a tracked job already covers that tip or the template is
    /// older than the current job.
    pub fn new_template(&self, rpc: RpcTemplate) -> Result<bool> {
        let mut jobs = self.jobs.write();

        if jobs
            .valid
            .iter()
            .any(|(_, job)| job.rpc().previous_block_hash == rpc.previous_block_hash)
        {
            return Ok(false);
        }

        if let Some(current) = &jobs.current
            && rpc.height < current.height()
        {
            debug!(
                "Ignoring stale template at height {} below current {}",
                rpc.height,
                current.height()
            );
            return Ok(false);
        }

        let job = self.build(jobs.next_id(), rpc, true)?;

        info!(
            "New block template at height {} with job {}",
            job.height(),
            job.job_id()
        );

        jobs.insert(job);

        Ok(true)
    }

    /// Issues a fresh job on the same tip so miners pick up a new coinbase
    /// timestamp and transaction set. Existing work stays valid.
    pub fn update_current_job(&self, rpc: RpcTemplate) -> Result<Arc<BlockTemplate>> {
        let mut jobs = self.jobs.write();
        let job = self.build(jobs.next_id(), rpc, false)?;
        jobs.insert(job.clone());
        Ok(job)
    }

    fn build(
        &self,
        job_id: JobId,
        rpc: RpcTemplate,
        clean_jobs: bool,
    ) -> Result<Arc<BlockTemplate>> {
        let job = Arc::new(BlockTemplate::new(
            job_id,
            rpc,
            &self.coinbase,
            EXTRANONCE1_SIZE + EXTRANONCE2_SIZE,
            clean_jobs,
        )?);

        self.network_difficulty.store(
            self.pow.network_difficulty(job.target()).to_bits(),
            Ordering::Relaxed,
        );

        Ok(job)
    }

    pub fn process_share(&self, submission: &ShareSubmission) -> Result<Share, StratumError> {
        if submission.extranonce2.len() != EXTRANONCE2_SIZE * 2 {
            return Err(StratumError::Extranonce2Size);
        }

        let extranonce2 =
            hex::decode(submission.extranonce2).map_err(|_| StratumError::Extranonce2Size)?;

        let job = submission
            .job_id
            .parse::<JobId>()
            .ok()
            .and_then(|job_id| self.job(job_id))
            .ok_or(StratumError::JobNotFound)?;

        let ntime = parse_word(submission.ntime).ok_or(StratumError::NtimeSize)?;

        if ntime < job.rpc().current_time || u64::from(ntime) > util::unix_time() + MAX_NTIME_OFFSET
        {
            return Err(StratumError::NtimeOutOfRange);
        }

        let nonce = parse_word(submission.nonce).ok_or(StratumError::NonceSize)?;

        if !job.register_submit(
            &submission.extranonce1.to_ascii_lowercase(),
            &submission.extranonce2.to_ascii_lowercase(),
            &submission.ntime.to_ascii_lowercase(),
            &submission.nonce.to_ascii_lowercase(),
        ) {
            return Err(StratumError::Duplicate);
        }

        let extranonce1 = hex::decode(submission.extranonce1)
            .map_err(|_| StratumError::other("invalid extranonce1"))?;

        let coinbase = job.serialize_coinbase(&extranonce1, &extranonce2);
        let merkle_root = job
            .merkle_tree()
            .with_first(self.pow.hash_coinbase(&coinbase));
        let header = job.serialize_header(merkle_root, ntime, nonce);
        let hash = U256::from_little_endian(&self.pow.hash_header(&header));

        let share_difficulty = self.pow.share_difficulty(hash);

        let block = (hash <= job.target()).then(|| FoundBlock {
            hash: self.pow.block_hash(&header),
            hex: hex::encode(job.serialize_block(&header, &coinbase)),
            height: job.height(),
        });

        let difficulty = if block.is_some() || hash <= self.pow.worker_target(submission.difficulty)
        {
            submission.difficulty
        } else {
            match submission.previous_difficulty {
                Some(previous) if hash <= self.pow.worker_target(previous) => previous,
                _ => return Err(StratumError::LowDifficulty { share_difficulty }),
            }
        };

        let invalid_block_hash = (block.is_none() && self.emit_invalid_block_hashes)
            .then(|| self.pow.block_hash(&header));

        Ok(Share {
            job_id: job.job_id(),
            height: job.height(),
            block_reward: job.rpc().coinbase_value,
            difficulty,
            share_difficulty,
            block_difficulty: self.pow.network_difficulty(job.target()),
            block,
            invalid_block_hash,
        })
    }
}

/// Exactly eight hex digits, big-endian. Signs and other prefixes are
/// rejected so one word has only one spelling up to case.
fn parse_word(hex: &str) -> Option<u32> {
    <[u8; 4]>::from_hex(hex).ok().map(u32::from_be_bytes)
}
