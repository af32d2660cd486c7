use crate::poll::error::{PollError, PollResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a device-side task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Init,
    Progress(u8),
    Done,
    Error(String),
}

impl TaskStatus {
    pub fn percent(&self) -> u8 {
        match self {
            TaskStatus::Init | TaskStatus::Error(_) => 0,
            TaskStatus::Progress(n) => *n,
            TaskStatus::Done => 100,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Init => f.write_str("init"),
            TaskStatus::Progress(n) => write!(f, "{n}%"),
            TaskStatus::Done => f.write_str("done"),
            TaskStatus::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// `status` arrives either as a keyword or as a bare percentage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawStatus {
    Number(u64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusData {
    pub status: RawStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// `{"code": 0, "data": {"status": .., "error_message": ..}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StatusData>,
}

impl StatusReply {
    pub fn with_status(status: &TaskStatus) -> Self {
        let (raw, error_message) = match status {
            TaskStatus::Init => (RawStatus::Text("init".into()), None),
            TaskStatus::Progress(n) => (RawStatus::Text(n.to_string()), None),
            TaskStatus::Done => (RawStatus::Text("done".into()), None),
            TaskStatus::Error(msg) => (RawStatus::Text("error".into()), Some(msg.clone())),
        };
        Self {
            code: 0,
            msg: None,
            data: Some(StatusData {
                status: raw,
                error_message,
            }),
        }
    }

    pub fn into_status(self) -> PollResult<TaskStatus> {
        if self.code != 0 {
            return Err(PollError::Source(format!(
                "device answered code {}: {}",
                self.code,
                self.msg.unwrap_or_default()
            )));
        }
        let data = self
            .data
            .ok_or_else(|| PollError::Schema("reply has no data object".into()))?;

        let percent = |n: u64| -> PollResult<TaskStatus> {
            u8::try_from(n)
                .ok()
                .filter(|n| *n <= 100)
                .map(TaskStatus::Progress)
                .ok_or_else(|| PollError::Schema(format!("progress {n} out of range")))
        };

        match data.status {
            RawStatus::Number(n) => percent(n),
            RawStatus::Text(text) => match text.trim() {
                "init" => Ok(TaskStatus::Init),
                "done" => Ok(TaskStatus::Done),
                "error" => Ok(TaskStatus::Error(
                    data.error_message
                        .unwrap_or_else(|| "no error message".into()),
                )),
                other => match other.parse::<u64>() {
                    Ok(n) => percent(n),
                    Err(_) => Err(PollError::Schema(format!("unknown status {other:?}"))),
                },
            },
        }
    }
}

/// Decode a status reply body.
///
/// A non-zero `code` is a failed poll (retryable); a reply that does not
/// match the schema is not.
pub fn parse_status_reply(body: &[u8]) -> PollResult<TaskStatus> {
    let reply: StatusReply = serde_json::from_slice(body).map_err(|e| {
        PollError::Schema(format!(
            "{:?}: {e}",
            String::from_utf8_lossy(body)
        ))
    })?;
    reply.into_status()
}
