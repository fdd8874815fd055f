use super::*;

/// The share difficulty 1 target, `0x00000000ffff0000...`.
pub static DIFF1: LazyLock<U256> = LazyLock::new(|| U256::from(0xffffu64) << 208);

/// Proof-of-work algorithms known to the pool, selected by name in the
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, DeserializeFromStr, SerializeDisplay)]
pub enum Algorithm {
    #[default]
    Sha256d,
    Scrypt,
}

impl Algorithm {
    /// Share difficulties of chains with a slow digest are reported on a scale
    /// multiplied by this factor.
    pub fn multiplier(self) -> u64 {
        match self {
            Self::Sha256d => 1,
            Self::Scrypt => 1 << 16,
        }
    }

    pub fn dividend(self) -> U256 {
        *DIFF1 * U256::from(self.multiplier())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha256d" => Ok(Self::Sha256d),
            "scrypt" => Ok(Self::Scrypt),
            "skein" | "hefty1" | "fugue" | "groestl" | "x11" | "quark" | "keccak" | "blake" => {
                bail!("algorithm `{s}` is not implemented")
            }
            _ => bail!("unknown algorithm `{s}`"),
        }
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Sha256d => write!(f, "sha256d"),
            Self::Scrypt => write!(f, "scrypt"),
        }
    }
}

#[derive(Debug, Clone)]
enum Digest {
    Sha256d,
    Scrypt(scrypt::Params),
}

/// Resolved proof-of-work registry entry handed to the job manager: the share
/// difficulty dividend together with the header digest.
#[derive(Debug, Clone)]
pub struct Pow {
    algorithm: Algorithm,
    dividend: U256,
    digest: Digest,
}

impl Pow {
    pub fn new(algorithm: Algorithm) -> Result<Self> {
        let digest = match algorithm {
            Algorithm::Sha256d => Digest::Sha256d,
            Algorithm::Scrypt => Digest::Scrypt(
                scrypt::Params::new(10, 1, 1, 32)
                    .map_err(|err| anyhow!("invalid scrypt parameters: {err}"))?,
            ),
        };

        Ok(Self {
            algorithm,
            dividend: algorithm.dividend(),
            digest,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn dividend(&self) -> U256 {
        self.dividend
    }

    /// Hashes a serialized header, result in internal (little-endian) byte
    /// order.
    pub fn hash_header(&self, header: &[u8]) -> [u8; 32] {
        match &self.digest {
            Digest::Sha256d => util::sha256d(header),
            Digest::Scrypt(params) => {
                let mut output = [0u8; 32];

                // only fails for an empty or oversized output buffer
                if scrypt::scrypt(header, header, params, &mut output).is_err() {
                    return [0xff; 32];
                }

                output
            }
        }
    }

    pub fn hash_coinbase(&self, coinbase: &[u8]) -> [u8; 32] {
        util::sha256d(coinbase)
    }

    /// Block hash in display (big-endian) order.
    pub fn block_hash(&self, header: &[u8]) -> String {
        hex::encode(util::reversed(&util::sha256d(header)))
    }

    /// Worker-facing difficulty of a header hash.
    pub fn share_difficulty(&self, hash: U256) -> f64 {
        util::difficulty_of(self.dividend, hash)
    }

    /// Network difficulty of a target expressed in worker units.
    pub fn network_difficulty(&self, target: U256) -> f64 {
        util::difficulty_of(self.dividend, target)
    }

    pub fn worker_target(&self, difficulty: f64) -> U256 {
        util::target_for_difficulty(self.dividend, difficulty)
    }
}
