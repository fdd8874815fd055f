use super::*;

/// Wire form of a Stratum error: `[code, message, traceback]`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct JsonRpcError {
    pub error_code: i32,
    pub message: String,
    pub traceback: Option<Value>,
}

impl Serialize for JsonRpcError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (&self.error_code, &self.message, &self.traceback).serialize(serializer)
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stratum error {}: {}", self.error_code, self.message)
    }
}

/// Reasons a request from a miner is refused.
#[derive(Debug, Clone, PartialEq, Snafu)]
pub enum StratumError {
    #[snafu(display("incorrect size of extranonce2"))]
    Extranonce2Size,
    #[snafu(display("job not found"))]
    JobNotFound,
    #[snafu(display("incorrect size of ntime"))]
    NtimeSize,
    #[snafu(display("ntime out of range"))]
    NtimeOutOfRange,
    #[snafu(display("incorrect size of nonce"))]
    NonceSize,
    #[snafu(display("duplicate share"))]
    Duplicate,
    #[snafu(display("low difficulty share of {share_difficulty}"))]
    LowDifficulty { share_difficulty: f64 },
    #[snafu(display("unauthorized worker"))]
    Unauthorized,
    #[snafu(display("not subscribed"))]
    NotSubscribed,
    #[snafu(display("{message}"))]
    Other { message: String },
}

impl StratumError {
    pub fn code(&self) -> i32 {
        match self {
            Self::Extranonce2Size
            | Self::NtimeSize
            | Self::NtimeOutOfRange
            | Self::NonceSize
            | Self::Other { .. } => 20,
            Self::JobNotFound => 21,
            Self::Duplicate => 22,
            Self::LowDifficulty { .. } => 23,
            Self::Unauthorized => 24,
            Self::NotSubscribed => 25,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    pub fn into_response(self) -> JsonRpcError {
        JsonRpcError {
            error_code: self.code(),
            message: self.to_string(),
            traceback: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn case(error: StratumError, code: i32, message: &str) {
        assert_eq!(error.code(), code);

        let response = error.into_response();
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!([code, message, null])
        );
    }

    #[test]
    fn codes() {
        case(StratumError::Extranonce2Size, 20, "incorrect size of extranonce2");
        case(StratumError::JobNotFound, 21, "job not found");
        case(StratumError::NtimeSize, 20, "incorrect size of ntime");
        case(StratumError::NtimeOutOfRange, 20, "ntime out of range");
        case(StratumError::NonceSize, 20, "incorrect size of nonce");
        case(StratumError::Duplicate, 22, "duplicate share");
        case(
            StratumError::LowDifficulty {
                share_difficulty: 0.5,
            },
            23,
            "low difficulty share of 0.5",
        );
        case(StratumError::Unauthorized, 24, "unauthorized worker");
        case(StratumError::NotSubscribed, 25, "not subscribed");
        case(StratumError::other("bad params"), 20, "bad params");
    }

    #[test]
    fn deserialize_tuple() {
        assert_eq!(
            serde_json::from_str::<JsonRpcError>(r#"[23,"low difficulty share of 1",null]"#)
                .unwrap(),
            JsonRpcError {
                error_code: 23,
                message: "low difficulty share of 1".into(),
                traceback: None,
            }
        );
    }
}
