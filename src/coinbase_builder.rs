use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RewardKind {
    #[default]
    Pow,
    Pos,
}

/// A fee output taking `percent` of the block reward.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    pub script: ScriptBuf,
    pub percent: f64,
}

/// Serialized coinbase split around the extranonce placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTransaction {
    pub prefix: Vec<u8>,
    pub suffix: Vec<u8>,
}

impl GenerationTransaction {
    pub fn serialize(&self, extranonce1: &[u8], extranonce2: &[u8]) -> Vec<u8> {
        let mut coinbase = Vec::with_capacity(
            self.prefix.len() + extranonce1.len() + extranonce2.len() + self.suffix.len(),
        );
        coinbase.extend_from_slice(&self.prefix);
        coinbase.extend_from_slice(extranonce1);
        coinbase.extend_from_slice(extranonce2);
        coinbase.extend_from_slice(&self.suffix);
        coinbase
    }

    pub fn coinb1(&self) -> String {
        hex::encode(&self.prefix)
    }

    pub fn coinb2(&self) -> String {
        hex::encode(&self.suffix)
    }
}

#[derive(Clone, Debug)]
pub struct CoinbaseBuilder {
    aux_flags: Vec<u8>,
    curtime: u32,
    extranonce_size: usize,
    height: u64,
    payee: Option<(ScriptBuf, u64)>,
    pool_script: ScriptBuf,
    pool_tag: String,
    recipients: Vec<Recipient>,
    reward: RewardKind,
    timestamp: u64,
    tx_message: Option<String>,
    value: u64,
    witness_commitment: Option<ScriptBuf>,
}

impl CoinbaseBuilder {
    const MAX_COINBASE_SCRIPT_SIG_SIZE: usize = 100;

    pub fn new(pool_script: ScriptBuf, height: u64, value: u64, extranonce_size: usize) -> Self {
        Self {
            aux_flags: Vec::new(),
            curtime: 0,
            extranonce_size,
            height,
            payee: None,
            pool_script,
            pool_tag: POOL_TAG.into(),
            recipients: Vec::new(),
            reward: RewardKind::Pow,
            timestamp: util::unix_time(),
            tx_message: None,
            value,
            witness_commitment: None,
        }
    }

    pub fn with_aux_flags(mut self, aux_flags: Vec<u8>) -> Self {
        self.aux_flags = aux_flags;
        self
    }

    #[cfg(test)]
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_reward(mut self, reward: RewardKind, curtime: u32) -> Self {
        self.reward = reward;
        self.curtime = curtime;
        self
    }

    pub fn with_recipients(mut self, recipients: Vec<Recipient>) -> Self {
        self.recipients = recipients;
        self
    }

    pub fn with_payee(mut self, script: ScriptBuf, amount: Option<u64>) -> Self {
        let amount = amount.unwrap_or_else(|| self.value.div_ceil(5));
        self.payee = Some((script, amount));
        self
    }

    pub fn with_witness_commitment(mut self, witness_commitment: ScriptBuf) -> Self {
        self.witness_commitment = Some(witness_commitment);
        self
    }

    pub fn with_tx_message(mut self, message: String) -> Self {
        self.tx_message = Some(message);
        self
    }

    pub fn with_pool_tag(mut self, pool_tag: String) -> Self {
        self.pool_tag = pool_tag;
        self
    }

    pub fn build(self) -> Result<GenerationTransaction> {
        let mut script_prefix = util::serialize_number(self.height);
        script_prefix.extend_from_slice(&self.aux_flags);
        script_prefix.extend(util::serialize_number(self.timestamp));
        script_prefix.push(
            self.extranonce_size
                .try_into()
                .context("extranonce placeholder too large")?,
        );

        let script_suffix = util::serialize_string(&self.pool_tag);

        let script_sig_size = script_prefix.len() + self.extranonce_size + script_suffix.len();

        ensure!(
            script_sig_size <= Self::MAX_COINBASE_SCRIPT_SIG_SIZE,
            "Script sig too large is {script_sig_size} bytes (max {})",
            Self::MAX_COINBASE_SCRIPT_SIG_SIZE
        );

        let version: u32 = if self.tx_message.is_some() { 2 } else { 1 };

        let mut prefix = Vec::new();
        prefix.extend_from_slice(&version.to_le_bytes());

        if self.reward == RewardKind::Pos {
            prefix.extend_from_slice(&self.curtime.to_le_bytes());
        }

        prefix.extend(util::var_int(1));
        prefix.extend_from_slice(&[0u8; 32]);
        prefix.extend_from_slice(&u32::MAX.to_le_bytes());
        prefix.extend(util::var_int(script_sig_size as u64));
        prefix.extend_from_slice(&script_prefix);

        let mut suffix = script_suffix;
        suffix.extend_from_slice(&0u32.to_le_bytes());
        suffix.extend(self.outputs());
        suffix.extend_from_slice(&0u32.to_le_bytes());

        if let Some(message) = &self.tx_message {
            suffix.extend(util::serialize_string(message));
        }

        Ok(GenerationTransaction { prefix, suffix })
    }

    fn outputs(&self) -> Vec<u8> {
        let mut reward = self.value;
        let mut pool_reward = self.value;
        let mut outputs = Vec::new();

        if let Some(witness_commitment) = &self.witness_commitment {
            outputs.push((0, witness_commitment.clone()));
        }

        let pool_index = outputs.len();
        outputs.push((0, self.pool_script.clone()));

        if let Some((script, amount)) = &self.payee {
            reward = reward.saturating_sub(*amount);
            pool_reward = pool_reward.saturating_sub(*amount);
            outputs.push((*amount, script.clone()));
        }

        for recipient in &self.recipients {
            let amount = (recipient.percent / 100.0 * reward as f64).floor() as u64;
            pool_reward = pool_reward.saturating_sub(amount);
            outputs.push((amount, recipient.script.clone()));
        }

        outputs[pool_index].0 = pool_reward;

        let mut bytes = util::var_int(outputs.len() as u64);

        for (value, script) in outputs {
            bytes.extend_from_slice(&value.to_le_bytes());
            bytes.extend(util::var_int(script.len() as u64));
            bytes.extend_from_slice(script.as_bytes());
        }

        bytes
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        bitcoin::{Amount, Sequence, Transaction},
        pretty_assertions::assert_eq as pretty_assert_eq,
    };

    fn pool_script() -> ScriptBuf {
        util::address_to_script("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4").unwrap()
    }

    fn recipient_script() -> ScriptBuf {
        util::address_to_script("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa").unwrap()
    }

    fn builder() -> CoinbaseBuilder {
        CoinbaseBuilder::new(pool_script(), 840_000, 50 * COIN_VALUE, 8)
            .with_timestamp(1_700_000_000)
    }

    fn decode(
        generation: &GenerationTransaction,
        extranonce1: &[u8],
        extranonce2: &[u8],
    ) -> Transaction {
        consensus::deserialize(&generation.serialize(extranonce1, extranonce2)).unwrap()
    }

    #[test]
    fn splice_is_positional() {
        let generation = builder().build().unwrap();

        for (extranonce1, extranonce2) in [
            ([0u8; 4], [0u8; 4]),
            ([0xde, 0xad, 0xbe, 0xef], [0x01, 0x02, 0x03, 0x04]),
            ([0xff; 4], [0xff; 4]),
        ] {
            let mut expected = generation.prefix.clone();
            expected.extend_from_slice(&extranonce1);
            expected.extend_from_slice(&extranonce2);
            expected.extend_from_slice(&generation.suffix);

            pretty_assert_eq!(generation.serialize(&extranonce1, &extranonce2), expected);
        }
    }

    #[test]
    fn spliced_coinbase_is_a_transaction() {
        let generation = builder().build().unwrap();
        let tx = decode(&generation, &[0xde, 0xad, 0xbe, 0xef], &[1, 2, 3, 4]);

        assert!(tx.is_coinbase());
        assert_eq!(tx.version, bitcoin::transaction::Version::ONE);
        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.input[0].sequence, Sequence::ZERO);
        assert_eq!(tx.output.len(), 1);
        assert_eq!(tx.output[0].value, Amount::from_sat(50 * COIN_VALUE));
        assert_eq!(tx.output[0].script_pubkey, pool_script());

        let script_sig = tx.input[0].script_sig.as_bytes();

        let mut expected = util::serialize_number(840_000);
        expected.extend(util::serialize_number(1_700_000_000));
        expected.push(8);
        expected.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef, 1, 2, 3, 4]);
        expected.extend(util::serialize_string(POOL_TAG));

        pretty_assert_eq!(script_sig, expected.as_slice());
    }

    #[test]
    fn prefix_ends_at_placeholder() {
        let generation = builder().build().unwrap();
        let tx = decode(&generation, &[0xaa; 4], &[0xbb; 4]);
        let bytes = consensus::serialize(&tx);

        let offset = generation.prefix.len();
        assert_eq!(&bytes[offset..offset + 8], &[0xaa, 0xaa, 0xaa, 0xaa, 0xbb, 0xbb, 0xbb, 0xbb]);
        assert_eq!(&bytes[offset + 8..], generation.suffix.as_slice());
    }

    #[test]
    fn aux_flags_follow_height() {
        let generation = builder()
            .with_aux_flags(vec![0x06, 0x2f, 0x50, 0x32, 0x53, 0x48, 0x2f])
            .build()
            .unwrap();

        let tx = decode(&generation, &[0; 4], &[0; 4]);
        let script_sig = tx.input[0].script_sig.as_bytes();
        let height = util::serialize_number(840_000);

        assert_eq!(&script_sig[..height.len()], height.as_slice());
        assert_eq!(
            &script_sig[height.len()..height.len() + 7],
            &[0x06, 0x2f, 0x50, 0x32, 0x53, 0x48, 0x2f]
        );
    }

    #[test]
    fn witness_commitment_comes_first() {
        let commitment = ScriptBuf::from_bytes(
            hex::decode(
                "6a24aa21a9ede2f61c3f71d1defd3fa999dfa36953755c690689799962b48bebd836974e8cf9",
            )
            .unwrap(),
        );

        let generation = builder()
            .with_witness_commitment(commitment.clone())
            .build()
            .unwrap();

        let tx = decode(&generation, &[0; 4], &[0; 4]);

        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[0].value, Amount::ZERO);
        assert_eq!(tx.output[0].script_pubkey, commitment);
        assert_eq!(tx.output[1].value, Amount::from_sat(50 * COIN_VALUE));
    }

    #[test]
    fn recipients_take_their_percentage() {
        let generation = builder()
            .with_recipients(vec![Recipient {
                script: recipient_script(),
                percent: 1.5,
            }])
            .build()
            .unwrap();

        let tx = decode(&generation, &[0; 4], &[0; 4]);

        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[0].script_pubkey, pool_script());
        assert_eq!(tx.output[0].value, Amount::from_sat(4_925_000_000));
        assert_eq!(tx.output[1].script_pubkey, recipient_script());
        assert_eq!(tx.output[1].value, Amount::from_sat(75_000_000));
    }

    #[test]
    fn payee_is_paid_before_recipients() {
        let generation = builder()
            .with_payee(recipient_script(), None)
            .with_recipients(vec![Recipient {
                script: recipient_script(),
                percent: 10.0,
            }])
            .build()
            .unwrap();

        let tx = decode(&generation, &[0; 4], &[0; 4]);

        assert_eq!(tx.output.len(), 3);
        assert_eq!(tx.output[1].value, Amount::from_sat(1_000_000_000));
        assert_eq!(tx.output[2].value, Amount::from_sat(400_000_000));
        assert_eq!(tx.output[0].value, Amount::from_sat(3_600_000_000));

        let total = tx.output.iter().map(|output| output.value.to_sat()).sum::<u64>();
        assert_eq!(total, 50 * COIN_VALUE);
    }

    #[test]
    fn explicit_payee_amount() {
        let generation = builder()
            .with_payee(recipient_script(), Some(1_000))
            .build()
            .unwrap();

        let tx = decode(&generation, &[0; 4], &[0; 4]);
        assert_eq!(tx.output[1].value, Amount::from_sat(1_000));
        assert_eq!(tx.output[0].value, Amount::from_sat(50 * COIN_VALUE - 1_000));
    }

    #[test]
    fn proof_of_stake_inserts_time() {
        let generation = builder()
            .with_reward(RewardKind::Pos, 0x5a5a5a5a)
            .build()
            .unwrap();

        assert_eq!(&generation.prefix[..8], &[1, 0, 0, 0, 0x5a, 0x5a, 0x5a, 0x5a]);
    }

    #[test]
    fn transaction_messages_bump_version() {
        let generation = builder()
            .with_tx_message("hello".into())
            .build()
            .unwrap();

        assert_eq!(&generation.prefix[..4], &[2, 0, 0, 0]);
        assert!(generation.suffix.ends_with(&util::serialize_string("hello")));
    }

    #[test]
    fn exceed_script_size_limit() {
        let result = builder().with_pool_tag("a".repeat(100)).build();

        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Script sig too large")
        );
    }

    #[test]
    fn hex_halves() {
        let generation = builder().build().unwrap();
        assert_eq!(generation.coinb1(), hex::encode(&generation.prefix));
        assert_eq!(generation.coinb2(), hex::encode(&generation.suffix));
        assert!(generation.coinb1().starts_with("01000000010000000000"));
    }
}
