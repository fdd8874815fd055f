use super::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Share(ShareEvent),
    BlockFound(BlockFoundEvent),
    UnknownMethod(UnknownMethodEvent),
}

impl Event {
    fn timestamp_mut(&mut self) -> &mut Option<u64> {
        match self {
            Event::Share(share) => &mut share.timestamp,
            Event::BlockFound(block) => &mut block.timestamp,
            Event::UnknownMethod(unknown) => &mut unknown.timestamp,
        }
    }

    pub(crate) fn stamp(&mut self) {
        self.timestamp_mut().get_or_insert_with(util::unix_time);
    }
}

/// One processed submission, accepted or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    pub job_id: String,
    pub ip: String,
    pub port: u16,
    pub worker: String,
    pub height: Option<u64>,
    pub block_reward: Option<u64>,
    pub difficulty: f64,
    pub share_difficulty: Option<f64>,
    pub block_difficulty: Option<f64>,
    pub block_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_block_hash: Option<String>,
    pub error: Option<String>,
}

#[cfg(test)]
impl ShareEvent {
    fn accepted(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of submitting a found block to the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockFoundEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    pub height: u64,
    pub block_hash: String,
    pub worker: String,
    pub accepted: bool,
    pub reason: Option<String>,
}

/// A request for a method the pool does not implement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownMethodEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    pub ip: String,
    pub port: u16,
    pub worker: Option<String>,
    pub method: String,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn share() -> Event {
        Event::Share(ShareEvent {
            timestamp: None,
            job_id: "1".into(),
            ip: "127.0.0.1".into(),
            port: 3333,
            worker: "rig1".into(),
            height: Some(800_000),
            block_reward: Some(312_500_000),
            difficulty: 16.0,
            share_difficulty: Some(18.5),
            block_difficulty: Some(1e12),
            block_hash: None,
            invalid_block_hash: None,
            error: None,
        })
    }

    #[test]
    fn tagged_json() {
        let json = serde_json::to_value(share()).unwrap();
        assert_eq!(json["type"], "share");
        assert_eq!(json["worker"], "rig1");
        assert!(json.get("timestamp").is_none());
        assert!(json.get("invalid_block_hash").is_none());

        let block = Event::BlockFound(BlockFoundEvent {
            timestamp: Some(1),
            height: 2,
            block_hash: "00".repeat(32),
            worker: "rig1".into(),
            accepted: false,
            reason: Some("high-hash".into()),
        });

        let json = serde_json::to_string(&block).unwrap();
        assert!(json.starts_with(r#"{"type":"block_found","timestamp":1"#));
        assert_eq!(serde_json::from_str::<Event>(&json).unwrap(), block);
    }

    #[test]
    fn stamp_keeps_existing_timestamp() {
        let mut event = share();
        event.stamp();
        let Event::Share(share) = &event else {
            unreachable!()
        };
        assert!(share.timestamp.unwrap() > 0);
        assert!(share.accepted());

        let mut event = Event::BlockFound(BlockFoundEvent {
            timestamp: Some(7),
            height: 1,
            block_hash: String::new(),
            worker: String::new(),
            accepted: true,
            reason: None,
        });
        event.stamp();
        assert_eq!(*event.timestamp_mut(), Some(7));
    }

    #[test]
    fn unknown_method_json() {
        let event = Event::UnknownMethod(UnknownMethodEvent {
            timestamp: None,
            ip: "127.0.0.1".into(),
            port: 3333,
            worker: None,
            method: "mining.suggest_target".into(),
        });

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "unknown_method",
                "ip": "127.0.0.1",
                "port": 3333,
                "worker": null,
                "method": "mining.suggest_target",
            })
        );
    }
}
