//! Broker registry and factory
//!
//! This module provides:
//! - The `Broker` / `Publisher` seam used by the cycle runner
//! - Concrete brokers (Redis Streams, demo)
//! - A factory resolving the broker from configuration
//!
//! The runner must interact with brokers exclusively through the
//! traits in `adapter`.

pub mod adapter;
pub mod demo;
pub mod redis_stream;

use std::sync::Arc;

use tokio::time::Duration;

use adapter::Broker;
use crate::config::BrokerConfig;

/// Returns the broker described by `cfg`.
///
/// DEMO MODE:
/// - `demo: true` wins over `url`; nothing is sent over the network
///
/// ERRORS:
/// - Malformed Redis URL (checked here, before the first cycle)
///
pub fn get_broker(cfg: &BrokerConfig) -> anyhow::Result<Arc<dyn Broker>> {
    if cfg.demo.unwrap_or(false) {
        return Ok(Arc::new(demo::DemoBroker));
    }

    let broker = redis_stream::RedisStreamBroker::new(
        &cfg.url,
        cfg.max_len,
        Duration::from_millis(cfg.timeout_ms),
    )?;
    Ok(Arc::new(broker))
}
