use chrono::{DateTime, Utc};

/// Proxy-granting ticket
///
/// Used by a service to obtain proxy tickets on behalf of a client.
/// Only minted after the service has proven, over a TLS-verified
/// callback, that it controls the URL which receives the ticket value.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProxyGrantingTicket {
    /// Unique ticket string
    #[serde(rename = "_id")]
    pub ticket: String,

    /// Id of the user the ticket was issued to
    pub user_id: String,

    /// When the ticket was issued
    pub created: DateTime<Utc>,

    /// When the ticket was consumed, set at most once
    pub consumed: Option<DateTime<Utc>>,

    /// Unique IOU string handed back synchronously to the requesting
    /// service while the ticket itself is delivered to its callback
    pub iou: String,

    /// Service ticket whose validation triggered issuance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_by_st: Option<String>,

    /// Proxy ticket whose validation triggered issuance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_by_pt: Option<String>,
}

/// Which ticket's validation triggered a proxy-granting ticket issuance
#[derive(Debug, Clone)]
pub enum GrantedBy {
    ServiceTicket(String),
    ProxyTicket(String),
}
