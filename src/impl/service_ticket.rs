use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::{database::Database, models::ServiceTicket, Casket, Result, Success, Ticket};

impl ServiceTicket {
    /// Issue a service ticket for a user and service
    ///
    /// `primary` records whether the ticket was issued from a fresh
    /// presentation of the user's credentials rather than an existing
    /// single sign-on session.
    pub async fn new(
        casket: &Casket,
        user_id: String,
        service: String,
        primary: bool,
    ) -> Result<ServiceTicket> {
        casket
            .create_ticket(|ticket, created| ServiceTicket {
                ticket,
                user_id: user_id.clone(),
                created,
                consumed: None,
                service: service.clone(),
                primary,
            })
            .await
    }

    /// Request single sign-out from the ticket's service
    ///
    /// Sends a SAML `LogoutRequest` document to the service URL,
    /// identifying the remote session by the ticket string that
    /// established it. Sign-out is best effort; failures are logged
    /// and never propagate.
    pub async fn request_sign_out(&self, casket: &Casket) {
        let body = format!(
            "<samlp:LogoutRequest xmlns:samlp=\"urn:oasis:names:tc:SAML:2.0:protocol\" \
             xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\" \
             ID=\"{}\" Version=\"2.0\" IssueInstant=\"{}\">\
             <saml:NameID>@NOT_USED@</saml:NameID>\
             <samlp:SessionIndex>{}</samlp:SessionIndex>\
             </samlp:LogoutRequest>",
            nanoid!(32),
            Utc::now().to_rfc3339(),
            self.ticket
        );

        let request = reqwest::Client::builder()
            .timeout(Duration::from_secs(casket.config.callback_timeout_seconds))
            .build()
            .map(|client| {
                client
                    .post(&self.service)
                    .form(&[("logoutRequest", body)])
            });

        let result = match request {
            Ok(request) => match request.send().await {
                Ok(response) => response.error_for_status().map(|_| ()),
                Err(error) => Err(error),
            },
            Err(error) => Err(error),
        };

        match result {
            Ok(()) => debug!("Single sign-out request sent to {}", self.service),
            Err(error) => warn!(
                "Single sign-out request to {} failed: {}",
                self.service, error
            ),
        }
    }
}

#[async_trait]
impl Ticket for ServiceTicket {
    const PREFIX: &'static str = "ST";
    const TITLE: &'static str = "service ticket";
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

    fn is_primary(&self) -> Option<bool> {
        Some(self.primary)
    }

    async fn insert(db: &Database, ticket: &Self) -> Success {
        db.save_service_ticket(ticket).await
    }

    async fn find(db: &Database, ticket: &str) -> Result<Option<Self>> {
        db.find_service_ticket(ticket).await
    }

    async fn mark_consumed(db: &Database, ticket: &str, at: DateTime<Utc>) -> Result<bool> {
        db.consume_service_ticket(ticket, at).await
    }

    async fn delete_invalid(db: &Database, created_before: DateTime<Utc>) -> Success {
        db.delete_invalid_service_tickets(created_before).await
    }

    async fn consume_all_for_user(
        db: &Database,
        user_id: &str,
        at: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Success {
        db.consume_service_tickets_for_user(user_id, at, created_before)
            .await
    }
}
