use super::*;

/// The subset of a `getblocktemplate` response the pool consumes.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct RpcTemplate {
    pub bits: String,
    #[serde(rename = "previousblockhash")]
    pub previous_block_hash: String,
    #[serde(rename = "curtime")]
    pub current_time: u32,
    pub height: u64,
    pub version: i32,
    #[serde(default)]
    pub transactions: Vec<TemplateTransaction>,
    #[serde(rename = "coinbasevalue")]
    pub coinbase_value: u64,
    #[serde(rename = "coinbaseaux", default)]
    pub coinbase_aux: CoinbaseAux,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_witness_commitment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee_amount: Option<u64>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct CoinbaseAux {
    #[serde(default)]
    pub flags: String,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct TemplateTransaction {
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl TemplateTransaction {
    fn id(&self) -> Result<&str> {
        self.txid
            .as_deref()
            .or(self.hash.as_deref())
            .ok_or_else(|| anyhow!("template transaction without txid or hash"))
    }
}

/// Pool-wide coinbase settings every job is built with.
#[derive(Debug, Clone)]
pub struct CoinbaseConfig {
    pub pool_script: ScriptBuf,
    pub recipients: Vec<Recipient>,
    pub reward: RewardKind,
    pub tx_message: Option<String>,
    pub pool_tag: String,
}

impl CoinbaseConfig {
    pub fn new(pool_script: ScriptBuf) -> Self {
        Self {
            pool_script,
            recipients: Vec::new(),
            reward: RewardKind::Pow,
            tx_message: None,
            pool_tag: POOL_TAG.into(),
        }
    }
}

/// One job: a node template made mineable.
#[derive(Debug)]
pub struct BlockTemplate {
    job_id: JobId,
    rpc: RpcTemplate,
    target: U256,
    difficulty: f64,
    bits: u32,
    prev_hash: [u8; 32],
    merkle_tree: MerkleTree,
    generation: GenerationTransaction,
    transaction_data: Vec<u8>,
    reward: RewardKind,
    clean_jobs: bool,
    submits: Mutex<HashSet<String>>,
    job_params: OnceLock<Notify>,
}

impl BlockTemplate {
    pub fn new(
        job_id: JobId,
        rpc: RpcTemplate,
        coinbase: &CoinbaseConfig,
        extranonce_size: usize,
        clean_jobs: bool,
    ) -> Result<Self> {
        let bits = u32::from_str_radix(&rpc.bits, 16)
            .with_context(|| format!("invalid bits `{}`", rpc.bits))?;

        let target = match &rpc.target {
            Some(target) => util::target_from_hex(target)?,
            None => util::target_from_bits(bits),
        };

        ensure!(!target.is_zero(), "template target is zero");

        let mut prev_hash = util::decode_hash(&rpc.previous_block_hash)?;
        prev_hash.reverse();

        let merkle_tree = MerkleTree::from_txids(
            rpc.transactions
                .iter()
                .map(TemplateTransaction::id)
                .collect::<Result<Vec<&str>>>()?,
        )?;

        let mut transaction_data = Vec::new();
        for transaction in &rpc.transactions {
            transaction_data.extend(
                hex::decode(&transaction.data).context("invalid template transaction data")?,
            );
        }

        let mut builder = CoinbaseBuilder::new(
            coinbase.pool_script.clone(),
            rpc.height,
            rpc.coinbase_value,
            extranonce_size,
        )
        .with_aux_flags(hex::decode(&rpc.coinbase_aux.flags).context("invalid coinbaseaux flags")?)
        .with_reward(coinbase.reward, rpc.current_time)
        .with_recipients(coinbase.recipients.clone())
        .with_pool_tag(coinbase.pool_tag.clone());

        if let Some(payee) = &rpc.payee {
            builder = builder.with_payee(util::address_to_script(payee)?, rpc.payee_amount);
        }

        if let Some(commitment) = &rpc.default_witness_commitment {
            builder = builder.with_witness_commitment(ScriptBuf::from_bytes(
                hex::decode(commitment).context("invalid witness commitment")?,
            ));
        }

        if let Some(message) = &coinbase.tx_message {
            builder = builder.with_tx_message(message.clone());
        }

        let generation = builder.build()?;

        Ok(Self {
            job_id,
            difficulty: util::difficulty_of(*DIFF1, target),
            target,
            bits,
            prev_hash,
            merkle_tree,
            generation,
            transaction_data,
            reward: coinbase.reward,
            clean_jobs,
            submits: Mutex::new(HashSet::new()),
            job_params: OnceLock::new(),
            rpc,
        })
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn rpc(&self) -> &RpcTemplate {
        &self.rpc
    }

    pub fn height(&self) -> u64 {
        self.rpc.height
    }

    pub fn target(&self) -> U256 {
        self.target
    }

    /// Network difficulty on the difficulty 1 scale.
    pub fn difficulty(&self) -> f64 {
        self.difficulty
    }

    pub fn merkle_tree(&self) -> &MerkleTree {
        &self.merkle_tree
    }

    pub fn generation(&self) -> &GenerationTransaction {
        &self.generation
    }

    pub fn clean_jobs(&self) -> bool {
        self.clean_jobs
    }

    pub fn serialize_coinbase(&self, extranonce1: &[u8], extranonce2: &[u8]) -> Vec<u8> {
        self.generation.serialize(extranonce1, extranonce2)
    }

    /// 80 byte header in consensus order: every field little-endian, hashes in
    /// internal byte order.
    pub fn serialize_header(&self, merkle_root: [u8; 32], ntime: u32, nonce: u32) -> [u8; 80] {
        let header = Header {
            version: block::Version::from_consensus(self.rpc.version),
            prev_blockhash: BlockHash::from_byte_array(self.prev_hash),
            merkle_root: TxMerkleNode::from_byte_array(merkle_root),
            time: ntime,
            bits: CompactTarget::from_consensus(self.bits),
            nonce,
        };

        let mut bytes = [0u8; 80];
        bytes.copy_from_slice(&consensus::serialize(&header));
        bytes
    }

    pub fn serialize_block(&self, header: &[u8], coinbase: &[u8]) -> Vec<u8> {
        let mut block = Vec::with_capacity(
            header.len() + 9 + coinbase.len() + self.transaction_data.len() + 1,
        );
        block.extend_from_slice(header);
        block.extend(util::var_int(self.rpc.transactions.len() as u64 + 1));
        block.extend_from_slice(coinbase);
        block.extend_from_slice(&self.transaction_data);

        if self.reward == RewardKind::Pos {
            block.push(0);
        }

        block
    }

    /// Records a submission, false if this exact tuple was seen before.
    pub fn register_submit(
        &self,
        extranonce1: &str,
        extranonce2: &str,
        ntime: &str,
        nonce: &str,
    ) -> bool {
        self.submits
            .lock()
            .insert(format!("{extranonce1}{extranonce2}{ntime}{nonce}"))
    }

    pub fn job_params(&self) -> &Notify {
        self.job_params.get_or_init(|| Notify {
            job_id: self.job_id,
            prevhash: hex::encode(util::reverse_byte_order(&util::reversed(&self.prev_hash))),
            coinb1: self.generation.coinb1(),
            coinb2: self.generation.coinb2(),
            merkle_branches: self.merkle_tree.branch(),
            version: format!("{:08x}", self.rpc.version),
            nbits: self.rpc.bits.clone(),
            ntime: format!("{:08x}", self.rpc.current_time),
            clean_jobs: self.clean_jobs,
        })
    }
}
