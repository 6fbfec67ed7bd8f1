use log::info;

use crate::error::CycleError;
use crate::schema::OutboundMessage;

use super::adapter::{Broker, Publisher};

/// Demo broker: no network, every message goes to the log.
///
/// Used for local runs without a Redis instance.
pub struct DemoBroker;

#[async_trait::async_trait]
impl Broker for DemoBroker {
    fn name(&self) -> &'static str {
        "demo"
    }

    async fn connect(&self) -> Result<Box<dyn Publisher>, CycleError> {
        Ok(Box::new(DemoPublisher))
    }
}

struct DemoPublisher;

#[async_trait::async_trait]
impl Publisher for DemoPublisher {
    async fn send(&mut self, topic: &str, message: &OutboundMessage) -> Result<(), CycleError> {
        let (key, value) = &message.attribute;
        info!("DEMO -> {} [{}={}] {}", topic, key, value, message.body_text());
        Ok(())
    }

    async fn close(self: Box<Self>) {}
}
