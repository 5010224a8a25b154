use serde::{Deserialize, Serialize};
use std::fmt;

/// Query-bearing request seen on a proxied connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEvent {
    pub conn_id: String,
    pub query_id: u64,
    /// Statement kind. Not filled by the proxy yet, always empty.
    pub statement_kind: String,
    pub query: String,
    /// Bound parameters of prepared statements (reserved).
    pub parameters: Option<Vec<String>>,
    /// Reserved.
    pub executable: bool,
}

impl CommandEvent {
    pub fn query(conn_id: impl Into<String>, query_id: u64, query: impl Into<String>) -> Self {
        Self {
            conn_id: conn_id.into(),
            query_id,
            statement_kind: String::new(),
            query: query.into(),
            parameters: None,
            executable: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Error,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Ok => "ok",
            ResultStatus::Error => "error",
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response packet observed for the latest query of a connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResultEvent {
    pub conn_id: String,
    pub query_id: u64,
    pub status: ResultStatus,
    /// Empty unless `status` is `Error`.
    pub error: String,
    /// Seconds since the query started, millisecond precision ("0.042").
    pub duration: String,
}

impl CommandResultEvent {
    pub fn is_error(&self) -> bool {
        self.status == ResultStatus::Error
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnState {
    Finished,
}

impl ConnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnState::Finished => "finished",
        }
    }
}

/// Lifecycle change of a proxied connection.
///
/// `Finished` can arrive twice for one connection (client quit, then teardown).
/// Consumers should treat it as last-write-wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnStateEvent {
    pub conn_id: String,
    pub state: ConnState,
}

impl ConnStateEvent {
    pub fn finished(conn_id: impl Into<String>) -> Self {
        Self {
            conn_id: conn_id.into(),
            state: ConnState::Finished,
        }
    }
}
