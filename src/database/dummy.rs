use chrono::{DateTime, Utc};
use futures::lock::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    models::{ProxyGrantingTicket, ProxyTicket, ServiceTicket},
    Error, Result, Success,
};

use super::{definition::AbstractDatabase, Migration};

/// In-memory store used for testing
///
/// Each map sits behind a single mutex, so the consume operations
/// are trivially serialised per ticket string.
#[derive(Default, Clone)]
pub struct DummyDb {
    pub service_tickets: Arc<Mutex<HashMap<String, ServiceTicket>>>,
    pub proxy_tickets: Arc<Mutex<HashMap<String, ProxyTicket>>>,
    pub proxy_granting_tickets: Arc<Mutex<HashMap<String, ProxyGrantingTicket>>>,
}

#[async_trait]
impl AbstractDatabase for DummyDb {
    /// Run a database migration
    async fn run_migration(&self, migration: Migration) -> Success {
        debug!("Skipping migration {:?}", migration);
        Ok(())
    }

    /// Save a new service ticket
    async fn save_service_ticket(&self, ticket: &ServiceTicket) -> Success {
        let mut tickets = self.service_tickets.lock().await;
        if tickets.contains_key(&ticket.ticket) {
            return Err(Error::DuplicateKey {
                with: "service_tickets",
            });
        }

        tickets.insert(ticket.ticket.to_string(), ticket.clone());
        Ok(())
    }

    /// Find service ticket by ticket string
    async fn find_service_ticket(&self, ticket: &str) -> Result<Option<ServiceTicket>> {
        let tickets = self.service_tickets.lock().await;
        Ok(tickets.get(ticket).cloned())
    }

    /// Atomically consume a service ticket
    async fn consume_service_ticket(&self, ticket: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut tickets = self.service_tickets.lock().await;
        match tickets.get_mut(ticket) {
            Some(ticket) if ticket.consumed.is_none() => {
                ticket.consumed = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Delete invalid service tickets
    async fn delete_invalid_service_tickets(&self, created_before: DateTime<Utc>) -> Success {
        let mut tickets = self.service_tickets.lock().await;
        tickets.retain(|_, ticket| ticket.consumed.is_none() && ticket.created > created_before);
        Ok(())
    }

    /// Consume a user's outstanding service tickets
    async fn consume_service_tickets_for_user(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Success {
        let mut tickets = self.service_tickets.lock().await;
        for ticket in tickets.values_mut() {
            if ticket.user_id == user_id
                && ticket.consumed.is_none()
                && ticket.created > created_before
            {
                ticket.consumed = Some(at);
            }
        }

        Ok(())
    }

    /// Save a new proxy ticket
    async fn save_proxy_ticket(&self, ticket: &ProxyTicket) -> Success {
        let mut tickets = self.proxy_tickets.lock().await;
        if tickets.contains_key(&ticket.ticket) {
            return Err(Error::DuplicateKey {
                with: "proxy_tickets",
            });
        }

        tickets.insert(ticket.ticket.to_string(), ticket.clone());
        Ok(())
    }

    /// Find proxy ticket by ticket string
    async fn find_proxy_ticket(&self, ticket: &str) -> Result<Option<ProxyTicket>> {
        let tickets = self.proxy_tickets.lock().await;
        Ok(tickets.get(ticket).cloned())
    }

    /// Atomically consume a proxy ticket
    async fn consume_proxy_ticket(&self, ticket: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut tickets = self.proxy_tickets.lock().await;
        match tickets.get_mut(ticket) {
            Some(ticket) if ticket.consumed.is_none() => {
                ticket.consumed = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Delete invalid proxy tickets
    async fn delete_invalid_proxy_tickets(&self, created_before: DateTime<Utc>) -> Success {
        let mut tickets = self.proxy_tickets.lock().await;
        tickets.retain(|_, ticket| ticket.consumed.is_none() && ticket.created > created_before);
        Ok(())
    }

    /// Consume a user's outstanding proxy tickets
    async fn consume_proxy_tickets_for_user(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Success {
        let mut tickets = self.proxy_tickets.lock().await;
        for ticket in tickets.values_mut() {
            if ticket.user_id == user_id
                && ticket.consumed.is_none()
                && ticket.created > created_before
            {
                ticket.consumed = Some(at);
            }
        }

        Ok(())
    }

    /// Save a new proxy-granting ticket
    async fn save_proxy_granting_ticket(&self, ticket: &ProxyGrantingTicket) -> Success {
        let mut tickets = self.proxy_granting_tickets.lock().await;
        if tickets.contains_key(&ticket.ticket)
            || tickets.values().any(|existing| existing.iou == ticket.iou)
        {
            return Err(Error::DuplicateKey {
                with: "proxy_granting_tickets",
            });
        }

        tickets.insert(ticket.ticket.to_string(), ticket.clone());
        Ok(())
    }

    /// Find proxy-granting ticket by ticket string
    async fn find_proxy_granting_ticket(
        &self,
        ticket: &str,
    ) -> Result<Option<ProxyGrantingTicket>> {
        let tickets = self.proxy_granting_tickets.lock().await;
        Ok(tickets.get(ticket).cloned())
    }

    /// Find proxy-granting ticket by IOU
    async fn find_proxy_granting_ticket_by_iou(
        &self,
        iou: &str,
    ) -> Result<Option<ProxyGrantingTicket>> {
        let tickets = self.proxy_granting_tickets.lock().await;
        Ok(tickets.values().find(|ticket| ticket.iou == iou).cloned())
    }

    /// Atomically consume a proxy-granting ticket
    async fn consume_proxy_granting_ticket(
        &self,
        ticket: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tickets = self.proxy_granting_tickets.lock().await;
        match tickets.get_mut(ticket) {
            Some(ticket) if ticket.consumed.is_none() => {
                ticket.consumed = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Delete invalid proxy-granting tickets
    async fn delete_invalid_proxy_granting_tickets(
        &self,
        created_before: DateTime<Utc>,
    ) -> Success {
        let mut tickets = self.proxy_granting_tickets.lock().await;
        tickets.retain(|_, ticket| ticket.consumed.is_none() && ticket.created > created_before);
        Ok(())
    }

    /// Consume a user's outstanding proxy-granting tickets
    async fn consume_proxy_granting_tickets_for_user(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Success {
        let mut tickets = self.proxy_granting_tickets.lock().await;
        for ticket in tickets.values_mut() {
            if ticket.user_id == user_id
                && ticket.consumed.is_none()
                && ticket.created > created_before
            {
                ticket.consumed = Some(at);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{AbstractDatabase, DummyDb, Migration};
    use crate::{
        models::{ProxyGrantingTicket, ServiceTicket},
        Error,
    };

    fn ticket(string: &str) -> ServiceTicket {
        ServiceTicket {
            ticket: string.to_string(),
            user_id: "user".to_string(),
            created: Utc::now(),
            consumed: None,
            service: "https://www.example.com".to_string(),
            primary: false,
        }
    }

    #[async_std::test]
    async fn it_rejects_duplicate_ticket_strings() {
        let db = DummyDb::default();
        let ticket = ticket("ST-1546300800-duplicate");

        assert_eq!(db.save_service_ticket(&ticket).await, Ok(()));
        assert_eq!(
            db.save_service_ticket(&ticket).await,
            Err(Error::DuplicateKey {
                with: "service_tickets"
            })
        );
    }

    #[async_std::test]
    async fn it_consumes_a_ticket_exactly_once_under_a_race() {
        let db = DummyDb::default();
        let string = "ST-1546300800-racing";
        db.save_service_ticket(&ticket(string)).await.unwrap();

        let now = Utc::now();
        let (first, second) = futures::join!(
            db.consume_service_ticket(string, now),
            db.consume_service_ticket(string, now)
        );

        // exactly one caller wins the transition
        assert!(first.unwrap() ^ second.unwrap());
    }

    #[async_std::test]
    async fn it_enforces_iou_uniqueness_and_supports_iou_lookup() {
        let db = DummyDb::default();
        db.run_migration(Migration::M2026_08_26EnsureTicketIndexes)
            .await
            .unwrap();

        let ticket = ProxyGrantingTicket {
            ticket: "PGT-1546300800-first".to_string(),
            user_id: "user".to_string(),
            created: Utc::now(),
            consumed: None,
            iou: "PGTIOU-1546300800-shared".to_string(),
            granted_by_st: None,
            granted_by_pt: None,
        };
        db.save_proxy_granting_ticket(&ticket).await.unwrap();

        let mut second = ticket.clone();
        second.ticket = "PGT-1546300800-second".to_string();
        assert_eq!(
            db.save_proxy_granting_ticket(&second).await,
            Err(Error::DuplicateKey {
                with: "proxy_granting_tickets"
            })
        );

        assert_eq!(
            db.find_proxy_granting_ticket_by_iou(&ticket.iou)
                .await
                .unwrap(),
            Some(ticket)
        );
        assert_eq!(
            db.find_proxy_granting_ticket_by_iou("PGTIOU-1546300800-unknown")
                .await
                .unwrap(),
            None
        );
    }

    #[async_std::test]
    async fn it_reports_missing_tickets_as_not_consumable() {
        let db = DummyDb::default();
        assert_eq!(
            db.consume_service_ticket("ST-1546300800-missing", Utc::now())
                .await,
            Ok(false)
        );
    }
}
