use chrono::{DateTime, Utc};

use crate::{database::Database, models::ProxyTicket, Casket, Result, Success, Ticket};

impl ProxyTicket {
    /// Issue a proxy ticket for a user and back-end service
    ///
    /// `granted_by_pgt` records the proxy-granting ticket that
    /// authorised issuance, where the deployment chains them.
    pub async fn new(
        casket: &Casket,
        user_id: String,
        service: String,
        granted_by_pgt: Option<String>,
    ) -> Result<ProxyTicket> {
        casket
            .create_ticket(|ticket, created| ProxyTicket {
                ticket,
                user_id: user_id.clone(),
                created,
                consumed: None,
                service: service.clone(),
                granted_by_pgt: granted_by_pgt.clone(),
            })
            .await
    }
}

#[async_trait]
impl Ticket for ProxyTicket {
    const PREFIX: &'static str = "PT";
    const TITLE: &'static str = "proxy ticket";
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

    fn service(&self) -> Option<&str> {
        Some(&self.service)
    }

    async fn insert(db: &Database, ticket: &Self) -> Success {
        db.save_proxy_ticket(ticket).await
    }

    async fn find(db: &Database, ticket: &str) -> Result<Option<Self>> {
        db.find_proxy_ticket(ticket).await
    }

    async fn mark_consumed(db: &Database, ticket: &str, at: DateTime<Utc>) -> Result<bool> {
        db.consume_proxy_ticket(ticket, at).await
    }

    async fn delete_invalid(db: &Database, created_before: DateTime<Utc>) -> Success {
        db.delete_invalid_proxy_tickets(created_before).await
    }

    async fn consume_all_for_user(
        db: &Database,
        user_id: &str,
        at: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Success {
        db.consume_proxy_tickets_for_user(user_id, at, created_before)
            .await
    }
}
