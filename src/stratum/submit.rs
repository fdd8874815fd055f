use super::*;

/// `mining.submit` parameters. Hex fields are kept as sent so the job manager
/// can validate their exact width.
#[derive(Debug, PartialEq, Clone)]
pub struct Submit {
    pub username: String,
    pub job_id: String,
    pub extranonce2: String,
    pub ntime: String,
    pub nonce: String,
}

impl Serialize for Submit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(5))?;
        seq.serialize_element(&self.username)?;
        seq.serialize_element(&self.job_id)?;
        seq.serialize_element(&self.extranonce2)?;
        seq.serialize_element(&self.ntime)?;
        seq.serialize_element(&self.nonce)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Submit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Five((String, String, String, String, String)),
            Six((String, String, String, String, String, Option<String>)),
        }

        let (username, job_id, extranonce2, ntime, nonce) = match Raw::deserialize(deserializer)? {
            Raw::Five(fields) => fields,
            Raw::Six((username, job_id, extranonce2, ntime, nonce, _version_bits)) => {
                (username, job_id, extranonce2, ntime, nonce)
            }
        };

        Ok(Submit {
            username,
            job_id,
            extranonce2,
            ntime,
            nonce,
        })
    }
}
