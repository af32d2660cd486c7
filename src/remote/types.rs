use crate::remote::error::{RemoteError, RemoteResult};
use serde::{Deserialize, Serialize};

/// Response header carrying the session id issued by `begin`.
pub const SESSION_ID_HEADER: &str = "file-id";

/// JSON body of a `begin` response when the id is not sent as a header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BeginReply {
    #[serde(rename = "file-id")]
    pub file_id: String,
}

/// Envelope the device firmware wraps around command results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceReply {
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl DeviceReply {
    pub fn ok(msg: impl Into<String>) -> Self {
        Self {
            code: 0,
            msg: Some(msg.into()),
        }
    }

    pub fn error(code: i64, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: Some(msg.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// Extract the session id from a `begin` response body.
///
/// The body must be a JSON object with a non-empty string `file-id`.
pub fn parse_begin_reply(body: &[u8]) -> RemoteResult<String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(RemoteError::MissingSessionId);
    }

    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| RemoteError::Schema(format!("begin reply is not JSON: {e}")))?;
    let Some(object) = value.as_object() else {
        return Err(RemoteError::Schema("begin reply is not a JSON object".into()));
    };
    if !object.contains_key("file-id") {
        return Err(RemoteError::MissingSessionId);
    }

    let reply: BeginReply = serde_json::from_value(value)
        .map_err(|e| RemoteError::Schema(format!("begin reply: {e}")))?;
    let id = reply.file_id.trim();
    if id.is_empty() {
        return Err(RemoteError::MissingSessionId);
    }
    Ok(id.to_string())
}

/// Interpret a successful HTTP body as a device command result.
///
/// An empty body means success; otherwise it must be a [`DeviceReply`] and
/// `code` must be 0.
pub fn parse_device_reply(body: &[u8]) -> RemoteResult<()> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }

    let reply: DeviceReply = serde_json::from_slice(body).map_err(|e| {
        RemoteError::Schema(format!(
            "expected {{\"code\": ..}} reply, got {:?}: {e}",
            String::from_utf8_lossy(body)
        ))
    })?;

    if !reply.is_ok() {
        return Err(RemoteError::Rejected {
            code: reply.code,
            message: reply.msg.unwrap_or_default(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_reply_from_body() {
        assert_eq!(
            parse_begin_reply(br#"{"file-id": "f81d4fae"}"#).unwrap(),
            "f81d4fae"
        );
    }

    #[test]
    fn test_begin_reply_missing_id() {
        assert!(matches!(parse_begin_reply(b""), Err(RemoteError::MissingSessionId)));
        assert!(matches!(
            parse_begin_reply(br#"{"status": 1}"#),
            Err(RemoteError::MissingSessionId)
        ));
        assert!(matches!(
            parse_begin_reply(br#"{"file-id": "  "}"#),
            Err(RemoteError::MissingSessionId)
        ));
    }

    #[test]
    fn test_begin_reply_no_alternate_field_names() {
        // Only `file-id` is recognised
        assert!(matches!(
            parse_begin_reply(br#"{"fileId": "abc"}"#),
            Err(RemoteError::MissingSessionId)
        ));
    }

    #[test]
    fn test_begin_reply_malformed() {
        assert!(matches!(parse_begin_reply(b"<html>"), Err(RemoteError::Schema(_))));
        assert!(matches!(parse_begin_reply(b"[1,2]"), Err(RemoteError::Schema(_))));
        assert!(matches!(
            parse_begin_reply(br#"{"file-id": 42}"#),
            Err(RemoteError::Schema(_))
        ));
    }

    #[test]
    fn test_device_reply() {
        assert!(parse_device_reply(b"").is_ok());
        assert!(parse_device_reply(br#"{"code": 0}"#).is_ok());
        assert!(parse_device_reply(br#"{"code": 0, "msg": "ok"}"#).is_ok());

        match parse_device_reply(br#"{"code": -1, "msg": "md5 mismatch"}"#) {
            Err(RemoteError::Rejected { code, message }) => {
                assert_eq!(code, -1);
                assert_eq!(message, "md5 mismatch");
            }
            other => panic!("Expected Rejected, got {other:?}"),
        }

        assert!(matches!(
            parse_device_reply(b"upload ok"),
            Err(RemoteError::Schema(_))
        ));
    }
}
