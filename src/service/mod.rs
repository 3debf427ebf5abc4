//! Services behind the HTTP surface
//!
//! [`Services`] is built once at startup and shared with the handlers through
//! axum state. It holds no caches or locks of its own; every operation goes
//! straight to storage.

pub mod auth;
pub mod rooms;

use std::sync::Arc;

use tracing::info;

use crate::config::Config;

pub struct Services {
    pub config: Config,
    pub auth: auth::Service,
    pub rooms: rooms::Service,
}

impl Services {
    /// Wire the services on top of `db`
    pub fn build<D>(db: Arc<D>, config: Config) -> Arc<Self>
    where
        D: rooms::Data + auth::RoomAccess + 'static,
    {
        let timeline = Arc::new(rooms::timeline::Service {
            db: db.clone(),
            server_name: config.server_name.clone(),
        });

        let services = Self {
            auth: auth::Service {
                authenticator: Arc::new(auth::TokenAuthenticator::new(&config.access_tokens)),
                room_access: db.clone(),
            },
            rooms: rooms::Service {
                relations: rooms::relations::Service {
                    db,
                    event_creator: timeline.clone(),
                },
                timeline,
            },
            config,
        };

        info!("✅ Services initialized for {}", services.config.server_name);
        Arc::new(services)
    }
}
