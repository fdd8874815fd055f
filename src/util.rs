use super::*;

/// Difficulties are scaled by this factor before the integer division so that
/// sub-unit difficulties still produce a finite target.
const DIFFICULTY_SCALE: u64 = 1 << 32;

pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(data).to_byte_array()
}

pub fn reversed(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().rev().copied().collect()
}

/// Stratum sends the previous block hash with the order of its 32-bit words
/// reversed but the bytes inside each word left alone.
pub fn reverse_byte_order(bytes: &[u8]) -> Vec<u8> {
    let mut swapped = vec![0u8; bytes.len()];

    for (src, dst) in bytes.chunks_exact(4).zip(swapped.chunks_exact_mut(4)) {
        LittleEndian::write_u32(dst, BigEndian::read_u32(src));
    }

    swapped.reverse();
    swapped
}

pub fn var_int(n: u64) -> Vec<u8> {
    consensus::serialize(&VarInt(n))
}

/// Script number encoding used for the height and timestamp in the coinbase
/// script sig. Values 1 through 16 use the single byte `OP_1`..`OP_16`.
pub fn serialize_number(n: u64) -> Vec<u8> {
    if (1..=16).contains(&n) {
        return vec![0x50 + n as u8];
    }

    let mut bytes = Vec::with_capacity(9);
    let mut n = n;

    while n > 0x7f {
        bytes.push((n & 0xff) as u8);
        n >>= 8;
    }

    bytes.push(n as u8);
    bytes.insert(0, bytes.len() as u8);
    bytes
}

pub fn serialize_string(s: &str) -> Vec<u8> {
    let mut bytes = var_int(s.len() as u64);
    bytes.extend_from_slice(s.as_bytes());
    bytes
}

pub fn decode_hash(hex: &str) -> Result<[u8; 32]> {
    <[u8; 32]>::from_hex(hex).with_context(|| format!("invalid 32 byte hash `{hex}`"))
}

/// Resolves a payout address to its output script. Addresses the bitcoin
/// parser understands are used as is, anything else is treated as a base58check
/// pay-to-pubkey-hash address of a foreign chain.
pub fn address_to_script(address: &str) -> Result<ScriptBuf> {
    if let Ok(address) = address.parse::<Address<NetworkUnchecked>>() {
        return Ok(address.assume_checked().script_pubkey());
    }

    let payload = base58::decode_check(address)
        .map_err(|err| anyhow!("invalid address `{address}`: {err}"))?;

    ensure!(
        payload.len() == 21,
        "invalid address `{address}`: expected 21 byte payload, got {}",
        payload.len()
    );

    let hash = PubkeyHash::from_slice(&payload[1..])?;

    Ok(ScriptBuf::new_p2pkh(&hash))
}

pub fn pubkey_to_script(pubkey: &str) -> Result<ScriptBuf> {
    let pubkey = pubkey
        .parse::<PublicKey>()
        .with_context(|| format!("invalid public key `{pubkey}`"))?;

    Ok(ScriptBuf::new_p2pk(&pubkey))
}

pub fn target_from_bits(bits: u32) -> U256 {
    let target = Target::from_compact(CompactTarget::from_consensus(bits));
    U256::from_big_endian(&target.to_be_bytes())
}

pub fn target_from_hex(hex: &str) -> Result<U256> {
    U256::from_str_radix(hex, 16).map_err(|err| anyhow!("invalid target `{hex}`: {err}"))
}

/// `dividend / difficulty`, saturating to the maximum target for difficulties
/// that are zero, negative or too small to represent.
pub fn target_for_difficulty(dividend: U256, difficulty: f64) -> U256 {
    if !difficulty.is_finite() || difficulty <= 0.0 {
        return U256::MAX;
    }

    let denominator = (difficulty * DIFFICULTY_SCALE as f64) as u128;

    if denominator == 0 {
        return U256::MAX;
    }

    (dividend / U256::from(denominator)).saturating_mul(U256::from(DIFFICULTY_SCALE))
}

pub fn to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}

pub fn difficulty_of(dividend: U256, value: U256) -> f64 {
    to_f64(dividend) / to_f64(value)
}

pub fn round_difficulty(difficulty: f64) -> f64 {
    (difficulty * 1e8).round() / 1e8
}

pub fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default()
}
