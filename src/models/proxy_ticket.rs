use chrono::{DateTime, Utc};

/// Proxy ticket
///
/// Used by a service as a credential to obtain access to a back-end
/// service on behalf of a client.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProxyTicket {
    /// Unique ticket string
    #[serde(rename = "_id")]
    pub ticket: String,

    /// Id of the user the ticket was issued to
    pub user_id: String,

    /// When the ticket was issued
    pub created: DateTime<Utc>,

    /// When the ticket was consumed, set at most once
    pub consumed: Option<DateTime<Utc>>,

    /// URL of the back-end service the ticket grants access to
    pub service: String,

    /// Proxy-granting ticket that authorised issuing this ticket
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_by_pgt: Option<String>,
}
