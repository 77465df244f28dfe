use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct Health {
    pub status: &'static str,
}

/// Error envelope returned by the storage HTTP surface: `{"err": "..."}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub err: String,
}

impl ErrorBody {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { err: msg.into() }
    }
}

/// Body of `GET /:key`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Option<String>,
}
