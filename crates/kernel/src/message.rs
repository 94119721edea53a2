use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use crate::KernelError;

pub type MsgId = String;

pub const PROTOCOL_VERSION: &str = "5.3";

const DELIMITER: &[u8] = b"<IDS|MSG>";

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Header {
    pub msg_id: MsgId,
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub date: String,
    pub msg_type: String,
    #[serde(default)]
    pub version: String,
}

impl Header {
    pub fn new(session: &str, msg_type: &str) -> Self {
        Self {
            msg_id: Uuid::new_v4().to_string(),
            session: session.to_string(),
            username: "sluice".to_string(),
            date: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            msg_type: msg_type.to_string(),
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// One message of the Jupyter messaging protocol, as seen on any channel.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelMessage {
    pub header: Header,
    pub parent_header: Option<Header>,
    pub metadata: Value,
    pub content: Value,
    pub buffers: Vec<Bytes>,
}

impl KernelMessage {
    pub fn new(session: &str, msg_type: &str, content: Value) -> Self {
        Self {
            header: Header::new(session, msg_type),
            parent_header: None,
            metadata: json!({}),
            content,
            buffers: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: &Header) -> Self {
        self.parent_header = Some(parent.clone());
        self
    }

    pub fn msg_id(&self) -> &str {
        &self.header.msg_id
    }

    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }

    pub fn parent_msg_id(&self) -> Option<&str> {
        self.parent_header.as_ref().map(|h| h.msg_id.as_str())
    }

    pub fn is_child_of(&self, msg_id: &str) -> bool {
        self.parent_msg_id() == Some(msg_id)
    }

    pub fn to_frames(&self, signer: &Signer) -> Result<Vec<Bytes>, KernelError> {
        let header = serde_json::to_vec(&self.header)?;
        let parent_header = match &self.parent_header {
            Some(parent) => serde_json::to_vec(parent)?,
            None => b"{}".to_vec(),
        };
        let metadata = serde_json::to_vec(&self.metadata)?;
        let content = serde_json::to_vec(&self.content)?;

        let signature = signer.sign(&[&header, &parent_header, &metadata, &content])?;

        let mut frames = vec![
            Bytes::from_static(DELIMITER),
            Bytes::from(signature),
            Bytes::from(header),
            Bytes::from(parent_header),
            Bytes::from(metadata),
            Bytes::from(content),
        ];
        frames.extend(self.buffers.iter().cloned());

        Ok(frames)
    }

    /// Decodes a multipart message, skipping any routing identities before the
    /// delimiter and checking the signature when the signer holds a key.
    pub fn from_frames(frames: Vec<Bytes>, signer: &Signer) -> Result<Self, KernelError> {
        let delimiter = frames
            .iter()
            .position(|f| f.as_ref() == DELIMITER)
            .ok_or_else(|| KernelError::Protocol("missing <IDS|MSG> delimiter".to_string()))?;

        let mut parts = frames.into_iter().skip(delimiter + 1);
        let mut next = |name: &str| {
            parts
                .next()
                .ok_or_else(|| KernelError::Protocol(format!("message is missing its {name} frame")))
        };

        let signature = next("signature")?;
        let header = next("header")?;
        let parent_header = next("parent header")?;
        let metadata = next("metadata")?;
        let content = next("content")?;
        let buffers = parts.collect();

        signer.verify(&signature, &[&header, &parent_header, &metadata, &content])?;

        let parent_header = match serde_json::from_slice::<Value>(&parent_header)? {
            Value::Object(map) if map.is_empty() => None,
            value => Some(serde_json::from_value(value)?),
        };

        Ok(Self {
            header: serde_json::from_slice(&header)?,
            parent_header,
            metadata: serde_json::from_slice(&metadata)?,
            content: serde_json::from_slice(&content)?,
            buffers,
        })
    }
}

/// HMAC-SHA256 message signing keyed by the connection key. An empty key
/// disables signing altogether.
#[derive(Debug, Clone, Default)]
pub struct Signer {
    key: Vec<u8>,
}

impl Signer {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    pub fn sign(&self, parts: &[&[u8]]) -> Result<String, KernelError> {
        match self.mac(parts)? {
            Some(mac) => Ok(hex::encode(mac.finalize().into_bytes())),
            None => Ok(String::new()),
        }
    }

    pub fn verify(&self, signature: &[u8], parts: &[&[u8]]) -> Result<(), KernelError> {
        let Some(mac) = self.mac(parts)? else {
            return Ok(());
        };

        let expected = hex::decode(signature)
            .map_err(|e| KernelError::Protocol(format!("malformed signature: {e}")))?;

        mac.verify_slice(&expected)
            .map_err(|_| KernelError::Protocol("signature mismatch".to_string()))
    }

    fn mac(&self, parts: &[&[u8]]) -> Result<Option<HmacSha256>, KernelError> {
        if self.key.is_empty() {
            return Ok(None);
        }

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| KernelError::Protocol(format!("invalid signing key: {e}")))?;
        for part in parts {
            mac.update(part);
        }

        Ok(Some(mac))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;

    fn execute_reply() -> KernelMessage {
        let request = KernelMessage::new("s1", "execute_request", json!({ "code": "1+1" }));
        KernelMessage::new("s1", "execute_reply", json!({ "status": "ok", "execution_count": 1 }))
            .with_parent(&request.header)
    }

    #[googletest::test]
    fn signed_message_survives_framing() {
        let signer = Signer::new("secret");
        let message = execute_reply();

        let decoded = KernelMessage::from_frames(message.to_frames(&signer).unwrap(), &signer);

        expect_that!(decoded, ok(eq(message)));
    }

    #[googletest::test]
    fn routing_identities_before_delimiter_are_skipped() {
        let signer = Signer::new("secret");
        let message = execute_reply();
        let mut frames = vec![Bytes::from_static(b"peer-identity")];
        frames.extend(message.to_frames(&signer).unwrap());

        let decoded = KernelMessage::from_frames(frames, &signer).unwrap();

        expect_that!(decoded.msg_type(), eq("execute_reply"));
        expect_that!(decoded.content["execution_count"], eq(json!(1)));
    }

    #[googletest::test]
    fn tampered_content_is_rejected() {
        let signer = Signer::new("secret");
        let mut frames = execute_reply().to_frames(&signer).unwrap();
        frames[5] = Bytes::from_static(br#"{"status":"error"}"#);

        let decoded = KernelMessage::from_frames(frames, &signer);

        expect_that!(decoded, err(displays_as(contains_substring("signature mismatch"))));
    }

    #[googletest::test]
    fn empty_key_produces_empty_signature() {
        let signer = Signer::default();
        let frames = execute_reply().to_frames(&signer).unwrap();

        expect_that!(frames[1].as_ref(), eq(b"".as_slice()));
    }

    #[googletest::test]
    fn empty_parent_header_decodes_as_absent() {
        let signer = Signer::default();
        let message = KernelMessage::new("s1", "status", json!({ "execution_state": "starting" }));

        let decoded = KernelMessage::from_frames(message.to_frames(&signer).unwrap(), &signer)
            .unwrap();

        expect_that!(decoded.parent_msg_id(), none());
    }

    #[googletest::test]
    fn frames_without_delimiter_are_rejected() {
        let frames = vec![Bytes::from_static(b"{}"), Bytes::from_static(b"{}")];

        let decoded = KernelMessage::from_frames(frames, &Signer::default());

        expect_that!(decoded, err(displays_as(contains_substring("delimiter"))));
    }

    #[googletest::test]
    fn child_messages_match_their_parent_only() {
        let reply = execute_reply();
        let parent_id = reply.parent_msg_id().unwrap().to_string();

        expect_that!(reply.is_child_of(&parent_id), eq(true));
        expect_that!(reply.is_child_of("some-other-request"), eq(false));
    }
}
