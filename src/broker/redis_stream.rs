use log::debug;
use redis::aio::MultiplexedConnection;
use redis::Client as RedisClient;
use tokio::time::{timeout, Duration};

use crate::error::CycleError;
use crate::schema::OutboundMessage;

use super::adapter::{Broker, Publisher};

/// Stream field holding the JSON body.
const BODY_FIELD: &str = "body";

/// Redis Streams broker.
///
/// A topic is a stream key. Each publish is one `XADD` whose fields
/// are the `moeda` attribute and the body, so consumers can filter on
/// the attribute with plain field access.
///
/// The `Client` only parses the URL; no socket is opened until
/// [`Broker::connect`] runs at the start of a cycle.
pub struct RedisStreamBroker {
    client: RedisClient,
    max_len: Option<usize>,
    timeout: Duration,
}

impl RedisStreamBroker {
    /// Fails only on a malformed URL.
    pub fn new(url: &str, max_len: Option<usize>, timeout: Duration) -> anyhow::Result<Self> {
        let client = RedisClient::open(url)?;
        Ok(Self {
            client,
            max_len,
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl Broker for RedisStreamBroker {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn connect(&self) -> Result<Box<dyn Publisher>, CycleError> {
        let conn = timeout(self.timeout, self.client.get_multiplexed_async_connection())
            .await
            .map_err(|_| CycleError::Connect(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| CycleError::Connect(e.to_string()))?;

        debug!("Redis publisher opened");

        Ok(Box::new(RedisStreamPublisher {
            conn,
            max_len: self.max_len,
            timeout: self.timeout,
        }))
    }
}

/// Connection-backed publisher for one cycle.
pub struct RedisStreamPublisher {
    conn: MultiplexedConnection,
    max_len: Option<usize>,
    timeout: Duration,
}

#[async_trait::async_trait]
impl Publisher for RedisStreamPublisher {
    async fn send(&mut self, topic: &str, message: &OutboundMessage) -> Result<(), CycleError> {
        let cmd = xadd_command(topic, self.max_len, message);
        let send_err = |reason: String| CycleError::Send {
            topic: topic.to_string(),
            reason,
        };

        let entry_id: String = timeout(self.timeout, cmd.query_async(&mut self.conn))
            .await
            .map_err(|_| send_err(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| send_err(e.to_string()))?;

        debug!("XADD {} -> {}", topic, entry_id);
        Ok(())
    }

    async fn close(self: Box<Self>) {
        // Dropping the last handle stops the connection driver task.
        drop(self.conn);
        debug!("Redis publisher closed");
    }
}

/// Builds `XADD <topic> [MAXLEN ~ n] * moeda <symbol> body <payload>`.
fn xadd_command(topic: &str, max_len: Option<usize>, message: &OutboundMessage) -> redis::Cmd {
    let mut cmd = redis::cmd("XADD");
    cmd.arg(topic);
    if let Some(n) = max_len {
        cmd.arg("MAXLEN").arg("~").arg(n);
    }
    let (key, value) = &message.attribute;
    cmd.arg("*")
        .arg(*key)
        .arg(value.as_str())
        .arg(BODY_FIELD)
        .arg(message.body.as_slice());
    cmd
}
