use chrono::{DateTime, Utc};

/// Service ticket
///
/// Used by a client as a credential to obtain access to a single
/// service. Issued upon presentation of credentials or an existing
/// single sign-on session.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServiceTicket {
    /// Unique ticket string
    #[serde(rename = "_id")]
    pub ticket: String,

    /// Id of the user the ticket was issued to
    pub user_id: String,

    /// When the ticket was issued
    pub created: DateTime<Utc>,

    /// When the ticket was consumed, set at most once
    pub consumed: Option<DateTime<Utc>>,

    /// URL of the service the ticket grants access to
    pub service: String,

    /// Whether the ticket was issued from the presentation of the
    /// user's primary credentials, rather than an existing session
    pub primary: bool,
}
