use super::*;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Clone)]
#[serde(untagged)]
pub enum Id {
    #[display("null")]
    Null,
    Number(u64),
    String(String),
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Message {
    Request {
        id: Id,
        method: String,
        params: Value,
    },
    Response {
        id: Id,
        result: Option<Value>,
        error: Option<JsonRpcError>,
    },
    Notification {
        id: Id,
        method: String,
        params: Value,
    },
}

impl Message {
    pub fn response(id: Id, result: Value) -> Self {
        Message::Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Id, error: JsonRpcError) -> Self {
        Message::Response {
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Server push, sent with `"id": null`.
    pub fn notification(method: &str, params: Value) -> Self {
        Message::Notification {
            id: Id::Null,
            method: method.into(),
            params,
        }
    }
}

/// Miners send requests with a numeric or string id, server pushes carry
/// `"id": null` and some clients omit the id entirely. Anything with a method
/// and a non-null id is a request, a method without one is a notification.
impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        let id = match value.get("id") {
            None | Some(Value::Null) => Id::Null,
            Some(id) => Id::deserialize(id).map_err(de::Error::custom)?,
        };

        if let Some(method) = value.get("method") {
            let method = method
                .as_str()
                .ok_or_else(|| de::Error::custom("method is not a string"))?
                .to_string();

            let params = value.get("params").cloned().unwrap_or(Value::Null);

            return Ok(if id == Id::Null {
                Message::Notification { id, method, params }
            } else {
                Message::Request { id, method, params }
            });
        }

        if value.get("result").is_some() || value.get("error").is_some() {
            #[derive(Deserialize)]
            struct Resp {
                result: Option<Value>,
                error: Option<JsonRpcError>,
            }

            let r: Resp = serde_json::from_value(value).map_err(de::Error::custom)?;

            return Ok(Message::Response {
                id,
                result: r.result,
                error: r.error,
            });
        }

        Err(de::Error::custom("unknown message format"))
    }
}
