use super::*;

/// `mining.subscribe` parameters. All of them are optional and only logged.
#[derive(Debug, PartialEq, Default)]
pub struct Subscribe {
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
}

impl<'de> Deserialize<'de> for Subscribe {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let params = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();

        let field = |i: usize| {
            params
                .get(i)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Ok(Subscribe {
            user_agent: field(0),
            session_id: field(1),
        })
    }
}

/// Reply to `mining.subscribe`:
/// `[["mining.notify", subscription_id], extranonce1, extranonce2_size]`.
#[derive(Debug, PartialEq, Clone)]
pub struct SubscribeResult {
    pub subscription: (String, String),
    pub extranonce1: String,
    pub extranonce2_size: usize,
}

impl Serialize for SubscribeResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&self.subscription)?;
        seq.serialize_element(&self.extranonce1)?;
        seq.serialize_element(&self.extranonce2_size)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for SubscribeResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (subscription, extranonce1, extranonce2_size) =
            <((String, String), String, usize)>::deserialize(deserializer)?;

        Ok(SubscribeResult {
            subscription,
            extranonce1,
            extranonce2_size,
        })
    }
}
