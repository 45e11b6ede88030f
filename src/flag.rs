// src/flag.rs
use serde::{Deserialize, Serialize};

/// Body returned by every successful `/subscribe` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFlag {
    #[serde(rename = "isSubscribed")]
    pub is_subscribed: bool,
}

/// Optional intent carried by `POST /subscribe`. A missing field means toggle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
