use chrono::{DateTime, Duration, Utc};

use crate::{
    database::Database,
    models::{ProxyGrantingTicket, ProxyTicket, ServiceTicket},
    util, Casket, CasketEvent, Config, Error, Result, Success,
};

/// Behaviour shared by every ticket kind
///
/// Implementors carry the four common fields (ticket string, user id,
/// creation and consumption timestamps) and dispatch the store
/// operations for their kind.
#[async_trait]
pub trait Ticket: Sized + Send + Sync {
    /// Prefix of issued ticket strings
    const PREFIX: &'static str;

    /// Human readable name used in logs and failure reasons
    const TITLE: &'static str;

    /// Whether validation demands a service identifier
    const REQUIRES_SERVICE: bool;

    fn ticket_string(&self) -> &str;

    fn user_id(&self) -> &str;

    fn created(&self) -> DateTime<Utc>;

    fn consumed(&self) -> Option<DateTime<Utc>>;

    fn set_consumed(&mut self, at: DateTime<Utc>);

    /// Service the ticket was issued for, if the kind carries one
    fn service(&self) -> Option<&str> {
        None
    }

    /// Whether the ticket was issued from primary credentials, if the
    /// kind tracks it
    fn is_primary(&self) -> Option<bool> {
        None
    }

    /// Lifetime of this ticket kind
    fn expiry(config: &Config) -> Duration {
        Duration::seconds(config.ticket_expiry_seconds)
    }

    /// Failure reported when no ticket exists for a string
    fn not_found(reason: String) -> Error {
        Error::InvalidTicket { reason }
    }

    fn is_consumed(&self) -> bool {
        self.consumed().is_some()
    }

    /// Expiry is a pure function of the creation time, the current
    /// time and the configured lifetime; it is never persisted
    fn is_expired_at(&self, config: &Config, now: DateTime<Utc>) -> bool {
        self.created() + Self::expiry(config) <= now
    }

    async fn insert(db: &Database, ticket: &Self) -> Success;

    async fn find(db: &Database, ticket: &str) -> Result<Option<Self>>;

    async fn mark_consumed(db: &Database, ticket: &str, at: DateTime<Utc>) -> Result<bool>;

    async fn delete_invalid(db: &Database, created_before: DateTime<Utc>) -> Success;

    async fn consume_all_for_user(
        db: &Database,
        user_id: &str,
        at: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Success;
}

fn reject<T>(error: Error) -> Result<T> {
    warn!("Ticket validation failed: {:?}", error);
    Err(error)
}

impl Casket {
    /// Issue a new ticket of the given kind
    ///
    /// Ticket string collisions are astronomically rare but must not
    /// be silently ignored; generation is retried a bounded number of
    /// times before the `DuplicateKey` propagates.
    pub(crate) async fn create_ticket<T, F>(&self, build: F) -> Result<T>
    where
        T: Ticket,
        F: Fn(String, DateTime<Utc>) -> T,
    {
        let mut attempt = 0;
        loop {
            let string = util::create_ticket_string(T::PREFIX, self.config.ticket_rand_length);
            let ticket = build(string, Utc::now());

            match T::insert(&self.database, &ticket).await {
                Ok(()) => {
                    debug!("Created {} {}", T::TITLE, ticket.ticket_string());

                    self.publish_event(CasketEvent::CreateTicket {
                        kind: T::TITLE.to_string(),
                        ticket: ticket.ticket_string().to_string(),
                    })
                    .await;

                    return Ok(ticket);
                }
                Err(Error::DuplicateKey { .. }) if attempt < 2 => attempt += 1,
                Err(error) => return Err(error),
            }
        }
    }

    /// Validate the ticket behind a ticket string, returning the
    /// consumed ticket if it is valid
    ///
    /// If `service` is provided and the ticket kind carries a service,
    /// the origins of the two are compared and must match. If `renew`
    /// is set, validation only succeeds if the ticket was issued from
    /// the presentation of the user's primary credentials.
    ///
    /// A ticket is consumed before its expiry is checked, so a ticket
    /// presented twice always reports as already used on the second
    /// presentation, even if it has also expired. The consumed check
    /// and the consumption mark are a single atomic store operation;
    /// of two racing validations exactly one can succeed.
    pub async fn validate_ticket<T: Ticket>(
        &self,
        ticket: &str,
        service: Option<&str>,
        renew: bool,
    ) -> Result<T> {
        if ticket.is_empty() {
            return reject(Error::InvalidRequest {
                with: "no ticket string provided",
            });
        }

        if T::REQUIRES_SERVICE && service.is_none() {
            return reject(Error::InvalidRequest {
                with: "no service identifier provided",
            });
        }

        if !util::matches_ticket_grammar(ticket, self.config.ticket_rand_length) {
            return reject(Error::InvalidTicket {
                reason: format!("Ticket string {} is invalid", ticket),
            });
        }

        let Some(mut found) = T::find(&self.database, ticket).await? else {
            return reject(T::not_found(format!(
                "{} {} does not exist",
                T::TITLE,
                ticket
            )));
        };

        let now = Utc::now();
        if !T::mark_consumed(&self.database, ticket, now).await? {
            return reject(Error::InvalidTicket {
                reason: format!("{} {} has already been used", T::TITLE, ticket),
            });
        }

        found.set_consumed(now);

        if found.is_expired_at(&self.config, now) {
            return reject(Error::InvalidTicket {
                reason: format!("{} {} has expired", T::TITLE, ticket),
            });
        }

        if let (Some(service), Some(ticket_service)) = (service, found.service()) {
            if !util::same_origin(ticket_service, service) {
                return reject(Error::InvalidService {
                    reason: format!(
                        "{} {} for service {} is invalid for service {}",
                        T::TITLE,
                        ticket,
                        ticket_service,
                        service
                    ),
                });
            }
        }

        if renew && !found.is_primary().unwrap_or(true) {
            return reject(Error::InvalidTicket {
                reason: format!(
                    "{} {} was not issued via primary credentials",
                    T::TITLE,
                    ticket
                ),
            });
        }

        info!("Validated {} {}", T::TITLE, ticket);

        self.publish_event(CasketEvent::ValidateTicket {
            kind: T::TITLE.to_string(),
            ticket: ticket.to_string(),
        })
        .await;

        Ok(found)
    }

    /// Delete all consumed or expired tickets of a kind
    ///
    /// Invalid tickets are no longer valid for future authentication
    /// attempts and can be safely deleted. Intended to run on a
    /// periodic external schedule.
    pub async fn delete_invalid_tickets<T: Ticket>(&self) -> Success {
        let created_before = Utc::now() - T::expiry(&self.config);
        T::delete_invalid(&self.database, created_before).await?;

        self.publish_event(CasketEvent::DeleteInvalidTickets {
            kind: T::TITLE.to_string(),
        })
        .await;

        Ok(())
    }

    /// Consume every outstanding ticket of a user
    ///
    /// Used at logout so that tickets issued for this user are no
    /// longer valid for future authentication attempts. Tickets which
    /// are already consumed or expired are left untouched.
    pub async fn consume_all_for_user(&self, user_id: &str) -> Success {
        let now = Utc::now();

        ServiceTicket::consume_all_for_user(
            &self.database,
            user_id,
            now,
            now - ServiceTicket::expiry(&self.config),
        )
        .await?;

        ProxyTicket::consume_all_for_user(
            &self.database,
            user_id,
            now,
            now - ProxyTicket::expiry(&self.config),
        )
        .await?;

        ProxyGrantingTicket::consume_all_for_user(
            &self.database,
            user_id,
            now,
            now - ProxyGrantingTicket::expiry(&self.config),
        )
        .await?;

        self.publish_event(CasketEvent::ConsumeAllTickets {
            user_id: user_id.to_string(),
        })
        .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::{
        database::DummyDb,
        models::{ProxyGrantingTicket, ServiceTicket},
        Casket, Database, Error, Ticket,
    };

    fn dummy(casket: &Casket) -> DummyDb {
        match &casket.database {
            Database::Dummy(db) => db.clone(),
            #[cfg(feature = "database-mongodb")]
            _ => unreachable!(),
        }
    }

    async fn issue(casket: &Casket, user_id: &str, primary: bool) -> ServiceTicket {
        ServiceTicket::new(
            casket,
            user_id.to_string(),
            "https://www.example.com/landing".to_string(),
            primary,
        )
        .await
        .unwrap()
    }

    #[async_std::test]
    async fn it_validates_a_ticket_exactly_once() {
        let casket = Casket::default();
        let ticket = issue(&casket, "user", true).await;

        let validated: ServiceTicket = casket
            .validate_ticket(&ticket.ticket, Some("https://www.example.com/other"), false)
            .await
            .unwrap();
        assert!(validated.is_consumed());

        assert_eq!(
            casket
                .validate_ticket::<ServiceTicket>(
                    &ticket.ticket,
                    Some("https://www.example.com/other"),
                    false
                )
                .await,
            Err(Error::InvalidTicket {
                reason: format!("service ticket {} has already been used", ticket.ticket)
            })
        );
    }

    #[async_std::test]
    async fn it_requires_a_ticket_string() {
        let casket = Casket::default();

        assert_eq!(
            casket
                .validate_ticket::<ServiceTicket>("", Some("https://www.example.com"), false)
                .await,
            Err(Error::InvalidRequest {
                with: "no ticket string provided"
            })
        );
    }

    #[async_std::test]
    async fn it_requires_a_service_identifier() {
        let casket = Casket::default();
        let ticket = issue(&casket, "user", true).await;

        assert_eq!(
            casket
                .validate_ticket::<ServiceTicket>(&ticket.ticket, None, false)
                .await,
            Err(Error::InvalidRequest {
                with: "no service identifier provided"
            })
        );
    }

    #[async_std::test]
    async fn it_rejects_malformed_ticket_strings_before_lookup() {
        let casket = Casket::default();

        assert_eq!(
            casket
                .validate_ticket::<ServiceTicket>(
                    "ST-123-short",
                    Some("https://www.example.com"),
                    false
                )
                .await,
            Err(Error::InvalidTicket {
                reason: "Ticket string ST-123-short is invalid".to_string()
            })
        );
    }

    #[async_std::test]
    async fn it_rejects_unknown_tickets() {
        let casket = Casket::default();
        let unknown = format!("ST-1546300800-{}", "a".repeat(32));

        assert_eq!(
            casket
                .validate_ticket::<ServiceTicket>(&unknown, Some("https://www.example.com"), false)
                .await,
            Err(Error::InvalidTicket {
                reason: format!("service ticket {} does not exist", unknown)
            })
        );
    }

    #[async_std::test]
    async fn it_distinguishes_unknown_proxy_granting_tickets() {
        let casket = Casket::default();
        let unknown = format!("PGT-1546300800-{}", "a".repeat(32));

        assert_eq!(
            casket
                .validate_ticket::<ProxyGrantingTicket>(
                    &unknown,
                    Some("https://www.example.com"),
                    false
                )
                .await,
            Err(Error::BadProxyGrantingTicket {
                reason: format!("proxy-granting ticket {} does not exist", unknown)
            })
        );
    }

    #[async_std::test]
    async fn it_rejects_expired_tickets() {
        let casket = Casket::default();
        let mut ticket = issue(&casket, "user", true).await;
        ticket.created = Utc::now() - Duration::minutes(10);
        dummy(&casket)
            .service_tickets
            .lock()
            .await
            .insert(ticket.ticket.clone(), ticket.clone());

        assert_eq!(
            casket
                .validate_ticket::<ServiceTicket>(
                    &ticket.ticket,
                    Some("https://www.example.com"),
                    false
                )
                .await,
            Err(Error::InvalidTicket {
                reason: format!("service ticket {} has expired", ticket.ticket)
            })
        );
    }

    #[async_std::test]
    async fn it_reports_expired_and_consumed_tickets_as_already_used() {
        let casket = Casket::default();
        let mut ticket = issue(&casket, "user", true).await;
        ticket.created = Utc::now() - Duration::minutes(10);
        ticket.consumed = Some(Utc::now() - Duration::minutes(9));
        dummy(&casket)
            .service_tickets
            .lock()
            .await
            .insert(ticket.ticket.clone(), ticket.clone());

        assert_eq!(
            casket
                .validate_ticket::<ServiceTicket>(
                    &ticket.ticket,
                    Some("https://www.example.com"),
                    false
                )
                .await,
            Err(Error::InvalidTicket {
                reason: format!("service ticket {} has already been used", ticket.ticket)
            })
        );
    }

    #[async_std::test]
    async fn it_compares_service_origins_not_paths() {
        let casket = Casket::default();

        let ticket = issue(&casket, "user", true).await;
        assert!(casket
            .validate_ticket::<ServiceTicket>(
                &ticket.ticket,
                Some("https://www.example.com/a/different/path"),
                false
            )
            .await
            .is_ok());

        let ticket = issue(&casket, "user", true).await;
        assert_eq!(
            casket
                .validate_ticket::<ServiceTicket>(
                    &ticket.ticket,
                    Some("https://evil.example.com/landing"),
                    false
                )
                .await,
            Err(Error::InvalidService {
                reason: format!(
                    "service ticket {} for service https://www.example.com/landing \
                     is invalid for service https://evil.example.com/landing",
                    ticket.ticket
                )
            })
        );
    }

    #[async_std::test]
    async fn it_enforces_primary_credentials_on_renew() {
        let casket = Casket::default();

        let ticket = issue(&casket, "user", false).await;
        assert_eq!(
            casket
                .validate_ticket::<ServiceTicket>(
                    &ticket.ticket,
                    Some("https://www.example.com"),
                    true
                )
                .await,
            Err(Error::InvalidTicket {
                reason: format!(
                    "service ticket {} was not issued via primary credentials",
                    ticket.ticket
                )
            })
        );

        let ticket = issue(&casket, "user", true).await;
        assert!(casket
            .validate_ticket::<ServiceTicket>(&ticket.ticket, Some("https://www.example.com"), true)
            .await
            .is_ok());
    }

    #[async_std::test]
    async fn it_consumes_all_outstanding_tickets_of_a_user() {
        let casket = Casket::default();

        let mine = issue(&casket, "user", true).await;
        let theirs = issue(&casket, "other", true).await;

        let mut expired = issue(&casket, "user", true).await;
        expired.created = Utc::now() - Duration::minutes(10);
        dummy(&casket)
            .service_tickets
            .lock()
            .await
            .insert(expired.ticket.clone(), expired.clone());

        casket.consume_all_for_user("user").await.unwrap();

        let dummy = dummy(&casket);
        let tickets = dummy.service_tickets.lock().await;
        assert!(tickets.get(&mine.ticket).unwrap().is_consumed());
        assert!(!tickets.get(&theirs.ticket).unwrap().is_consumed());
        // expired tickets are left for the cleanup sweep
        assert!(!tickets.get(&expired.ticket).unwrap().is_consumed());
    }

    #[async_std::test]
    async fn it_deletes_consumed_and_expired_tickets() {
        let casket = Casket::default();

        let valid = issue(&casket, "user", true).await;

        let consumed = issue(&casket, "user", true).await;
        casket
            .validate_ticket::<ServiceTicket>(
                &consumed.ticket,
                Some("https://www.example.com"),
                false,
            )
            .await
            .unwrap();

        let mut expired = issue(&casket, "user", true).await;
        expired.created = Utc::now() - Duration::minutes(10);
        dummy(&casket)
            .service_tickets
            .lock()
            .await
            .insert(expired.ticket.clone(), expired.clone());

        casket.delete_invalid_tickets::<ServiceTicket>().await.unwrap();

        let dummy = dummy(&casket);
        let tickets = dummy.service_tickets.lock().await;
        assert!(tickets.contains_key(&valid.ticket));
        assert!(!tickets.contains_key(&consumed.ticket));
        assert!(!tickets.contains_key(&expired.ticket));
    }

    #[async_std::test]
    async fn it_publishes_lifecycle_events() {
        use crate::CasketEvent;

        let (sender, receiver) = async_std::channel::unbounded();
        let casket = Casket {
            event_channel: Some(sender),
            ..Default::default()
        };

        let ticket = issue(&casket, "user", true).await;

        match receiver.try_recv().unwrap() {
            CasketEvent::CreateTicket { kind, ticket: t } => {
                assert_eq!(kind, ServiceTicket::TITLE);
                assert_eq!(t, ticket.ticket);
            }
            event => panic!("unexpected event {:?}", event),
        }
    }
}
