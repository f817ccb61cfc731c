use chrono::{DateTime, Utc};

use crate::{
    models::{ProxyGrantingTicket, ProxyTicket, ServiceTicket},
    Result, Success,
};

use super::Migration;

/// Persistence contract for the three ticket kinds
///
/// Correctness under concurrent validation rests on the `consume_*`
/// operations: each is an atomic compare-and-set which returns `true`
/// only for the single caller that transitioned the ticket from
/// unconsumed to consumed. Two racing calls on the same ticket string
/// must never both observe `true`.
#[async_trait]
pub trait AbstractDatabase: std::marker::Sync {
    /// Run a database migration
    async fn run_migration(&self, migration: Migration) -> Success;

    /// Save a new service ticket, failing with `DuplicateKey` if the
    /// ticket string already exists
    async fn save_service_ticket(&self, ticket: &ServiceTicket) -> Success;

    /// Find service ticket by ticket string
    async fn find_service_ticket(&self, ticket: &str) -> Result<Option<ServiceTicket>>;

    /// Atomically consume a service ticket, returning whether this
    /// call performed the transition
    async fn consume_service_ticket(&self, ticket: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Delete all service tickets which are consumed or were created
    /// at or before the given cutoff
    async fn delete_invalid_service_tickets(&self, created_before: DateTime<Utc>) -> Success;

    /// Consume every unconsumed service ticket of a user created
    /// after the given cutoff
    async fn consume_service_tickets_for_user(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Success;

    /// Save a new proxy ticket, failing with `DuplicateKey` if the
    /// ticket string already exists
    async fn save_proxy_ticket(&self, ticket: &ProxyTicket) -> Success;

    /// Find proxy ticket by ticket string
    async fn find_proxy_ticket(&self, ticket: &str) -> Result<Option<ProxyTicket>>;

    /// Atomically consume a proxy ticket, returning whether this call
    /// performed the transition
    async fn consume_proxy_ticket(&self, ticket: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Delete all proxy tickets which are consumed or were created at
    /// or before the given cutoff
    async fn delete_invalid_proxy_tickets(&self, created_before: DateTime<Utc>) -> Success;

    /// Consume every unconsumed proxy ticket of a user created after
    /// the given cutoff
    async fn consume_proxy_tickets_for_user(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Success;

    /// Save a new proxy-granting ticket, failing with `DuplicateKey`
    /// if the ticket string or the IOU already exists
    async fn save_proxy_granting_ticket(&self, ticket: &ProxyGrantingTicket) -> Success;

    /// Find proxy-granting ticket by ticket string
    async fn find_proxy_granting_ticket(&self, ticket: &str)
        -> Result<Option<ProxyGrantingTicket>>;

    /// Find proxy-granting ticket by IOU
    async fn find_proxy_granting_ticket_by_iou(
        &self,
        iou: &str,
    ) -> Result<Option<ProxyGrantingTicket>>;

    /// Atomically consume a proxy-granting ticket, returning whether
    /// this call performed the transition
    async fn consume_proxy_granting_ticket(&self, ticket: &str, at: DateTime<Utc>)
        -> Result<bool>;

    /// Delete all proxy-granting tickets which are consumed or were
    /// created at or before the given cutoff
    async fn delete_invalid_proxy_granting_tickets(
        &self,
        created_before: DateTime<Utc>,
    ) -> Success;

    /// Consume every unconsumed proxy-granting ticket of a user
    /// created after the given cutoff
    async fn consume_proxy_granting_tickets_for_user(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Success;
}
