#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event_type")]
pub enum CasketEvent {
    CreateTicket {
        kind: String,
        ticket: String,
    },
    ValidateTicket {
        kind: String,
        ticket: String,
    },
    ConsumeAllTickets {
        user_id: String,
    },
    DeleteInvalidTickets {
        kind: String,
    },
}
