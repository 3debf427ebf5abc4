pub mod relations;
pub mod timeline;

use std::sync::Arc;

/// Storage needed by the room services
pub trait Data: relations::Data + timeline::Data {}

pub struct Service {
    pub relations: relations::Service,
    pub timeline: Arc<timeline::Service>,
}
