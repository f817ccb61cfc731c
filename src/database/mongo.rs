use bson::{to_bson, Bson, Document};
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use std::ops::Deref;

use crate::{
    models::{ProxyGrantingTicket, ProxyTicket, ServiceTicket},
    Error, Result, Success,
};

use super::{definition::AbstractDatabase, Migration};

static SERVICE_TICKETS: &str = "service_tickets";
static PROXY_TICKETS: &str = "proxy_tickets";
static PROXY_GRANTING_TICKETS: &str = "proxy_granting_tickets";

#[derive(Clone)]
pub struct MongoDb(pub mongodb::Database);

impl Deref for MongoDb {
    type Target = mongodb::Database;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    match error.kind.as_ref() {
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(write)) => {
            write.code == 11000
        }
        _ => false,
    }
}

impl MongoDb {
    async fn insert<T>(&self, collection: &'static str, ticket: &T) -> Success
    where
        T: serde::Serialize + Send + Sync,
    {
        self.collection::<T>(collection)
            .insert_one(ticket)
            .await
            .map(|_| ())
            .map_err(|error| {
                if is_duplicate_key(&error) {
                    Error::DuplicateKey { with: collection }
                } else {
                    Error::DatabaseError {
                        operation: "insert_one",
                        with: collection,
                    }
                }
            })
    }

    async fn find_by(&self, collection: &'static str, filter: Document) -> Result<Option<Document>> {
        self.collection::<Document>(collection)
            .find_one(filter)
            .await
            .map_err(|_| Error::DatabaseError {
                operation: "find_one",
                with: collection,
            })
    }

    async fn consume(
        &self,
        collection: &'static str,
        ticket: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.collection::<Document>(collection)
            .update_one(
                doc! { "_id": ticket, "consumed": Bson::Null },
                doc! { "$set": { "consumed": timestamp(at)? } },
            )
            .await
            .map(|result| result.modified_count == 1)
            .map_err(|_| Error::DatabaseError {
                operation: "update_one",
                with: collection,
            })
    }

    async fn consume_for_user(
        &self,
        collection: &'static str,
        user_id: &str,
        at: DateTime<Utc>,
        created_before: DateTime<Utc>,
        created_of: fn(&Document) -> Result<DateTime<Utc>>,
    ) -> Success {
        let candidates: Vec<Document> = self
            .collection::<Document>(collection)
            .find(doc! { "user_id": user_id, "consumed": Bson::Null })
            .await
            .map_err(|_| Error::DatabaseError {
                operation: "find",
                with: collection,
            })?
            .try_collect()
            .await
            .map_err(|_| Error::DatabaseError {
                operation: "find",
                with: collection,
            })?;

        let mut outstanding = vec![];
        for document in &candidates {
            if created_of(document)? > created_before {
                outstanding.push(document.get_str("_id").unwrap_or_default().to_string());
            }
        }

        self.collection::<Document>(collection)
            .update_many(
                doc! { "_id": { "$in": outstanding }, "consumed": Bson::Null },
                doc! { "$set": { "consumed": timestamp(at)? } },
            )
            .await
            .map(|_| ())
            .map_err(|_| Error::DatabaseError {
                operation: "update_many",
                with: collection,
            })
    }

    async fn delete_invalid(
        &self,
        collection: &'static str,
        created_before: DateTime<Utc>,
        created_of: fn(&Document) -> Result<DateTime<Utc>>,
    ) -> Success {
        let tickets: Vec<Document> = self
            .collection::<Document>(collection)
            .find(doc! {})
            .await
            .map_err(|_| Error::DatabaseError {
                operation: "find",
                with: collection,
            })?
            .try_collect()
            .await
            .map_err(|_| Error::DatabaseError {
                operation: "find",
                with: collection,
            })?;

        let mut invalid = vec![];
        for document in &tickets {
            let consumed = !matches!(document.get("consumed"), None | Some(Bson::Null));
            if consumed || created_of(document)? <= created_before {
                invalid.push(document.get_str("_id").unwrap_or_default().to_string());
            }
        }

        self.collection::<Document>(collection)
            .delete_many(doc! { "_id": { "$in": invalid } })
            .await
            .map(|_| ())
            .map_err(|_| Error::DatabaseError {
                operation: "delete_many",
                with: collection,
            })
    }
}

fn timestamp(at: DateTime<Utc>) -> Result<Bson> {
    to_bson(&at).map_err(|_| Error::DatabaseError {
        operation: "to_bson",
        with: "timestamp",
    })
}

fn created_of(document: &Document) -> Result<DateTime<Utc>> {
    bson::from_bson(document.get("created").cloned().unwrap_or(Bson::Null)).map_err(|_| {
        Error::DatabaseError {
            operation: "from_bson",
            with: "created",
        }
    })
}

fn deserialise<T: serde::de::DeserializeOwned>(document: Document) -> Result<T> {
    bson::from_document(document).map_err(|_| Error::DatabaseError {
        operation: "from_document",
        with: "ticket",
    })
}

#[async_trait]
impl AbstractDatabase for MongoDb {
    /// Run a database migration
    async fn run_migration(&self, migration: Migration) -> Success {
        match migration {
            #[cfg(debug_assertions)]
            Migration::WipeAll => {
                // Drop the entire database
                self.drop().await.unwrap();
            }
            Migration::M2026_08_26EnsureTicketIndexes => {
                // Make sure all collections exist
                let list = self.list_collection_names().await.unwrap();
                let collections = [SERVICE_TICKETS, PROXY_TICKETS, PROXY_GRANTING_TICKETS];

                for name in collections {
                    if !list.contains(&name.to_string()) {
                        self.create_collection(name).await.unwrap();
                    }
                }

                for name in collections {
                    self.run_command(doc! {
                        "createIndexes": name,
                        "indexes": [
                            {
                                "key": {
                                    "user_id": 1
                                },
                                "name": "user_id"
                            }
                        ]
                    })
                    .await
                    .unwrap();
                }

                // The IOU shares the ticket string uniqueness guarantee
                self.run_command(doc! {
                    "createIndexes": PROXY_GRANTING_TICKETS,
                    "indexes": [
                        {
                            "key": {
                                "iou": 1
                            },
                            "name": "iou",
                            "unique": true
                        }
                    ]
                })
                .await
                .unwrap();
            }
        }

        Ok(())
    }

    /// Save a new service ticket
    async fn save_service_ticket(&self, ticket: &ServiceTicket) -> Success {
        self.insert(SERVICE_TICKETS, ticket).await
    }

    /// Find service ticket by ticket string
    async fn find_service_ticket(&self, ticket: &str) -> Result<Option<ServiceTicket>> {
        self.find_by(SERVICE_TICKETS, doc! { "_id": ticket })
            .await?
            .map(deserialise)
            .transpose()
    }

    /// Atomically consume a service ticket
    async fn consume_service_ticket(&self, ticket: &str, at: DateTime<Utc>) -> Result<bool> {
        self.consume(SERVICE_TICKETS, ticket, at).await
    }

    /// Delete invalid service tickets
    async fn delete_invalid_service_tickets(&self, created_before: DateTime<Utc>) -> Success {
        self.delete_invalid(SERVICE_TICKETS, created_before, created_of)
            .await
    }

    /// Consume a user's outstanding service tickets
    async fn consume_service_tickets_for_user(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Success {
        self.consume_for_user(SERVICE_TICKETS, user_id, at, created_before, created_of)
            .await
    }

    /// Save a new proxy ticket
    async fn save_proxy_ticket(&self, ticket: &ProxyTicket) -> Success {
        self.insert(PROXY_TICKETS, ticket).await
    }

    /// Find proxy ticket by ticket string
    async fn find_proxy_ticket(&self, ticket: &str) -> Result<Option<ProxyTicket>> {
        self.find_by(PROXY_TICKETS, doc! { "_id": ticket })
            .await?
            .map(deserialise)
            .transpose()
    }

    /// Atomically consume a proxy ticket
    async fn consume_proxy_ticket(&self, ticket: &str, at: DateTime<Utc>) -> Result<bool> {
        self.consume(PROXY_TICKETS, ticket, at).await
    }

    /// Delete invalid proxy tickets
    async fn delete_invalid_proxy_tickets(&self, created_before: DateTime<Utc>) -> Success {
        self.delete_invalid(PROXY_TICKETS, created_before, created_of)
            .await
    }

    /// Consume a user's outstanding proxy tickets
    async fn consume_proxy_tickets_for_user(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Success {
        self.consume_for_user(PROXY_TICKETS, user_id, at, created_before, created_of)
            .await
    }

    /// Save a new proxy-granting ticket
    async fn save_proxy_granting_ticket(&self, ticket: &ProxyGrantingTicket) -> Success {
        self.insert(PROXY_GRANTING_TICKETS, ticket).await
    }

    /// Find proxy-granting ticket by ticket string
    async fn find_proxy_granting_ticket(
        &self,
        ticket: &str,
    ) -> Result<Option<ProxyGrantingTicket>> {
        self.find_by(PROXY_GRANTING_TICKETS, doc! { "_id": ticket })
            .await?
            .map(deserialise)
            .transpose()
    }

    /// Find proxy-granting ticket by IOU
    async fn find_proxy_granting_ticket_by_iou(
        &self,
        iou: &str,
    ) -> Result<Option<ProxyGrantingTicket>> {
        self.find_by(PROXY_GRANTING_TICKETS, doc! { "iou": iou })
            .await?
            .map(deserialise)
            .transpose()
    }

    /// Atomically consume a proxy-granting ticket
    async fn consume_proxy_granting_ticket(
        &self,
        ticket: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.consume(PROXY_GRANTING_TICKETS, ticket, at).await
    }

    /// Delete invalid proxy-granting tickets
    async fn delete_invalid_proxy_granting_tickets(
        &self,
        created_before: DateTime<Utc>,
    ) -> Success {
        self.delete_invalid(PROXY_GRANTING_TICKETS, created_before, created_of)
            .await
    }

    /// Consume a user's outstanding proxy-granting tickets
    async fn consume_proxy_granting_tickets_for_user(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> Success {
        self.consume_for_user(
            PROXY_GRANTING_TICKETS,
            user_id,
            at,
            created_before,
            created_of,
        )
        .await
    }
}
