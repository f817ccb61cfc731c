#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Error {
    /// A required request parameter was missing
    InvalidRequest {
        with: &'static str,
    },
    /// Ticket string is malformed, unknown, already used or expired
    InvalidTicket {
        reason: String,
    },
    /// Ticket was issued for a different service origin
    InvalidService {
        reason: String,
    },
    /// No proxy-granting ticket exists for the given string
    BadProxyGrantingTicket {
        reason: String,
    },
    /// Uniqueness violation while inserting a ticket
    DuplicateKey {
        with: &'static str,
    },
    /// Proxy callback URL could not be verified
    CallbackFailed {
        reason: String,
    },
    DatabaseError {
        operation: &'static str,
        with: &'static str,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
pub type Success = Result<()>;
