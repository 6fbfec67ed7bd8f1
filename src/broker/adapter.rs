use crate::error::CycleError;
use crate::schema::OutboundMessage;

/// Broker is the seam between the cycle runner and a concrete
/// message broker.
///
/// A `Broker` itself holds no live connection. It only knows how to
/// open one: every cycle calls [`Broker::connect`] to get a fresh
/// [`Publisher`], sends through it, then releases it.
///
/// DESIGN GOALS:
/// - No broker-specific logic in the runner
/// - One publisher per cycle, never pooled
/// - Uniform error tagging (connect / send)
///
/// THREAD SAFETY:
/// - Must be Send + Sync, the runner lives in a spawned task
///
#[async_trait::async_trait]
pub trait Broker: Send + Sync {

    /// Short name used in logs (e.g. "redis", "demo").
    fn name(&self) -> &'static str;

    /// Opens a publisher handle for one cycle.
    ///
    /// ERRORS:
    /// - `CycleError::Connect` when the broker cannot be reached
    ///
    async fn connect(&self) -> Result<Box<dyn Publisher>, CycleError>;
}

/// A publisher handle scoped to a single cycle.
///
/// LIFECYCLE:
/// - Created by [`Broker::connect`]
/// - At most one [`Publisher::send`] per cycle
/// - Consumed by [`Publisher::close`], which makes a second release
///   impossible
///
#[async_trait::async_trait]
pub trait Publisher: Send {

    /// Publishes `message` to `topic`.
    ///
    /// A single attempt. No retries here: the next cycle is the retry.
    ///
    async fn send(&mut self, topic: &str, message: &OutboundMessage) -> Result<(), CycleError>;

    /// Releases the underlying connection.
    ///
    /// Must not fail; release problems are logged by the implementation.
    async fn close(self: Box<Self>);
}
