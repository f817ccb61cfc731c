#[macro_use]
extern crate serde;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate async_trait;
#[macro_use]
extern crate nanoid;
#[macro_use]
extern crate log;

#[cfg(feature = "database-mongodb")]
#[macro_use]
extern crate bson;

mod result;
pub use result::*;

pub mod config;
pub mod database;
pub mod events;
pub mod r#impl;
pub mod models;
pub mod util;

pub use config::Config;
pub use database::{Database, Migration};
pub use events::CasketEvent;
pub use r#impl::ticket::Ticket;

use async_std::channel::Sender;

/// Casket state
#[derive(Default, Clone)]
pub struct Casket {
    pub config: Config,
    pub database: Database,
    pub event_channel: Option<Sender<CasketEvent>>,
}

impl Casket {
    pub async fn publish_event(&self, event: CasketEvent) {
        if let Some(sender) = &self.event_channel {
            if let Err(err) = sender.send(event).await {
                error!("Failed to publish a Casket event: {:?}", err);
            }
        }
    }
}
