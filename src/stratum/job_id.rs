use super::*;

/// Hex job identifier. Ids wrap back to 1 instead of reaching a multiple of
/// `0xffff`, and 0 is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeserializeFromStr, SerializeDisplay, Hash)]
#[repr(transparent)]
pub struct JobId(u64);

impl JobId {
    const WRAP: u64 = 0xffff;

    pub fn new(n: u64) -> Self {
        Self(n)
    }

    pub fn next(self) -> Self {
        let next = self.0.wrapping_add(1);

        if next % Self::WRAP == 0 {
            Self(1)
        } else {
            Self(next)
        }
    }
}

impl FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = u64::from_str_radix(s, 16)
            .with_context(|| format!("invalid job id hex string `{s}`"))?;
        Ok(JobId(id))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl From<JobId> for u64 {
    fn from(id: JobId) -> u64 {
        id.0
    }
}
