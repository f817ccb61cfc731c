use chrono::{DateTime, Duration, Utc};

use crate::{
    database::Database,
    models::{GrantedBy, ProxyGrantingTicket},
    util, Casket, CasketEvent, Config, Error, Result, Success, Ticket,
};

impl ProxyGrantingTicket {
    /// Prefix of issued IOU strings
    pub const IOU_PREFIX: &'static str = "PGTIOU";

    /// Issue a proxy-granting ticket, validating the proxy callback
    /// URL first
    ///
    /// Both ticket strings are generated up front, then the callback
    /// handshake runs, and only on success is the ticket persisted.
    /// A proxy-granting ticket must never exist in the store unless
    /// its owning service has proven, over the TLS-verified callback,
    /// that it controls the URL which receives the ticket value. On
    /// callback failure nothing has been created and `None` is
    /// returned.
    pub async fn issue(
        casket: &Casket,
        pgt_url: &str,
        user_id: String,
        granted_by: Option<GrantedBy>,
    ) -> Result<Option<ProxyGrantingTicket>> {
        let pgt_id = util::create_ticket_string(Self::PREFIX, casket.config.ticket_rand_length);
        let pgt_iou =
            util::create_ticket_string(Self::IOU_PREFIX, casket.config.ticket_rand_length);

        if let Err(error) = casket
            .validate_proxy_callback(pgt_url, &pgt_id, &pgt_iou)
            .await
        {
            warn!("Refusing to issue proxy-granting ticket: {:?}", error);
            return Ok(None);
        }

        let (granted_by_st, granted_by_pt) = match granted_by {
            Some(GrantedBy::ServiceTicket(ticket)) => (Some(ticket), None),
            Some(GrantedBy::ProxyTicket(ticket)) => (None, Some(ticket)),
            None => (None, None),
        };

        let ticket = ProxyGrantingTicket {
            ticket: pgt_id,
            user_id,
            created: Utc::now(),
            consumed: None,
            iou: pgt_iou,
            granted_by_st,
            granted_by_pt,
        };

        ProxyGrantingTicket::insert(&casket.database, &ticket).await?;
        debug!("Created {} {}", Self::TITLE, ticket.ticket);

        casket
            .publish_event(CasketEvent::CreateTicket {
                kind: Self::TITLE.to_string(),
                ticket: ticket.ticket.to_string(),
            })
            .await;

        Ok(Some(ticket))
    }
}

#[async_trait]
impl Ticket for ProxyGrantingTicket {
    const PREFIX: &'static str = "PGT";
    const TITLE: &'static str = "proxy-granting ticket";
    const REQUIRES_SERVICE: bool = true;

    fn ticket_string(&self) -> &str {
        &self.ticket
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn created(&self) -> DateTime<Utc> {
        self.created
    }

    fn consumed(&self) -> Option<DateTime<Utc>> {
        self.consumed
    }

    fn set_consumed(&mut self, at: DateTime<Utc>) {
        self.consumed = Some(at);
    }

    /// Proxy-granting tickets live as long as the single sign-on
    /// session that produced them
    fn expiry(config: &Config) -> Duration {
        Duration::seconds(config.proxy_granting_ticket_expiry_seconds)
    }

    /// Distinguished so callers can render the protocol-specific
    /// error code for an unknown proxy-granting ticket
    fn not_found(reason: String) -> Error {
        Error::BadProxyGrantingTicket { reason }
    }

    async fn insert(db: &Database, ticket: &Self) -> Success {
        db.save_proxy_granting_ticket(ticket).await
    }

    async fn find(db: &Database, ticket: &str) -> Result<Option<Self>> {
        db.find_proxy_granting_ticket(ticket).await
    }

    async fn mark_consumed(db: &Database, ticket: &str, at: DateTime<Utc>) -> Result<bool> {
        db.consume_proxy_granting_ticket(ticket, at).await
    }

    async fn delete_invalid(db: &Database, created_before: DateTime<Utc>) -> Success {
        db.delete_invalid_proxy_granting_tickets(created_before)
            .await
    }

    async fn consume_all_for_user(
        db: &Database,
        user_id: &str,
        at: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Success {
        db.consume_proxy_granting_tickets_for_user(user_id, at, created_before)
            .await
    }
}
