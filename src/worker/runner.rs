use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Local;
use log::{error, info};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::{
    broker::adapter::{Broker, Publisher},
    currency::{Currency, CURRENCIES},
    error::CycleError,
    metrics::RuntimeMetrics,
    schema::OutboundMessage,
    synth::{JitterSource, QuoteSynthesizer},
};

use super::state::RunnerState;

/// Drives the publish cycles until cancelled.
///
/// One cycle:
/// - Select the currency at the cursor
/// - Open a publisher, synthesize, serialize, send, close the publisher
/// - Log the outcome and advance the cursor (success or failure)
///
/// Between cycles the runner waits `interval`, racing the shutdown token.
///
/// GUARANTEES:
/// - Cycles never overlap
/// - A failing cycle never stops the loop
/// - Every opened publisher is closed in the same cycle
///
pub struct QuoteCycleRunner<J> {
    broker: Arc<dyn Broker>,
    synth: QuoteSynthesizer<J>,
    currencies: &'static [Currency],
    state: RunnerState,
    topic: String,
    interval: Duration,
    metrics: Arc<RuntimeMetrics>,
}

impl<J: JitterSource> QuoteCycleRunner<J> {
    pub fn new(
        broker: Arc<dyn Broker>,
        synth: QuoteSynthesizer<J>,
        topic: impl Into<String>,
        interval: Duration,
        metrics: Arc<RuntimeMetrics>,
    ) -> Self {
        Self::with_currencies(broker, synth, topic, interval, metrics, &CURRENCIES)
    }

    /// Runner over a custom rotation table.
    pub fn with_currencies(
        broker: Arc<dyn Broker>,
        synth: QuoteSynthesizer<J>,
        topic: impl Into<String>,
        interval: Duration,
        metrics: Arc<RuntimeMetrics>,
        currencies: &'static [Currency],
    ) -> Self {
        Self {
            broker,
            synth,
            currencies,
            state: RunnerState::new(currencies.len()),
            topic: topic.into(),
            interval,
            metrics,
        }
    }

    /// Runs cycles until `shutdown` is cancelled.
    ///
    /// Cancellation is checked before each cycle, while acquiring the
    /// publisher and during the interval wait. Once a publisher is held
    /// the cycle runs to completion.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            "Starting quote cycles: topic={} interval={:?} broker={}",
            self.topic,
            self.interval,
            self.broker.name()
        );

        while !shutdown.is_cancelled() {
            self.run_cycle(&shutdown).await;
            if !shutdown.is_cancelled() {
                info!("Cycle completed at: {}", Local::now().to_rfc3339());
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
        }

        info!("Quote cycles stopped");
    }

    /// Runs exactly one cycle. Errors are logged and swallowed.
    ///
    /// If `shutdown` fires before a publisher is acquired the cycle is
    /// abandoned: nothing is sent and the cursor stays where it is.
    pub async fn run_cycle(&mut self, shutdown: &CancellationToken) {
        let currency = self.currencies[self.state.cursor()];
        self.metrics.cycles_started.fetch_add(1, Ordering::Relaxed);

        match self.publish(&currency, shutdown).await {
            Ok(Some(message)) => {
                self.metrics.quotes_published.fetch_add(1, Ordering::Relaxed);
                info!("Sent to topic {}: {}", self.topic, message.body_text());
            }
            Ok(None) => {
                info!("Cycle [{}] abandoned: shutdown requested before publishing", currency.symbol);
                return;
            }
            Err(e) => {
                self.metrics.record_failure(e.kind());
                error!("Cycle failed [{}] kind={} | message={}", currency.symbol, e.kind(), e);
            }
        }

        self.state.advance();
    }

    /// Acquires a publisher for this cycle and always releases it.
    ///
    /// Returns `Ok(None)` when shutdown wins the race against the acquire.
    async fn publish(
        &mut self,
        currency: &Currency,
        shutdown: &CancellationToken,
    ) -> Result<Option<OutboundMessage>, CycleError> {
        let mut publisher = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(None),
            acquired = self.broker.connect() => acquired?,
        };
        self.metrics.publishers_acquired.fetch_add(1, Ordering::Relaxed);

        let outcome = self.build_and_send(publisher.as_mut(), currency).await;

        publisher.close().await;
        self.metrics.publishers_released.fetch_add(1, Ordering::Relaxed);

        outcome.map(Some)
    }

    async fn build_and_send(
        &mut self,
        publisher: &mut dyn Publisher,
        currency: &Currency,
    ) -> Result<OutboundMessage, CycleError> {
        let quote = self.synth.synthesize(currency);
        let message = OutboundMessage::from_quote(&quote)?;
        publisher.send(&self.topic, &message).await?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::{EUR, USD};
    use crate::schema::Quote;
    use crate::synth::tests::ScriptedJitter;
    use crate::synth::RngJitter;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal::Decimal;
    use std::collections::HashSet;
    use std::sync::Mutex;

    // --------------------------------------------------------
    // In-memory broker recording every interaction
    // --------------------------------------------------------

    #[derive(Default)]
    struct Recorder {
        connect_attempts: usize,
        opened: usize,
        closed: usize,
        open_now: usize,
        max_open: usize,
        attempted: Vec<String>,
        attempted_at: Vec<tokio::time::Instant>,
        delivered: Vec<(String, OutboundMessage)>,
    }

    #[derive(Default)]
    struct RecordingBroker {
        log: Arc<Mutex<Recorder>>,
        fail_connect_on: HashSet<usize>,
        fail_send_on: HashSet<usize>,
    }

    impl RecordingBroker {
        fn failing(connect: &[usize], send: &[usize]) -> Self {
            Self {
                fail_connect_on: connect.iter().copied().collect(),
                fail_send_on: send.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl Broker for RecordingBroker {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn connect(&self) -> Result<Box<dyn Publisher>, CycleError> {
            let mut log = self.log.lock().unwrap();
            log.connect_attempts += 1;
            let attempt = log.connect_attempts;
            if self.fail_connect_on.contains(&attempt) {
                return Err(CycleError::Connect("connection refused".into()));
            }
            log.opened += 1;
            log.open_now += 1;
            log.max_open = log.max_open.max(log.open_now);

            Ok(Box::new(RecordingPublisher {
                log: self.log.clone(),
                fail: self.fail_send_on.contains(&attempt),
            }))
        }
    }

    struct RecordingPublisher {
        log: Arc<Mutex<Recorder>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Publisher for RecordingPublisher {
        async fn send(&mut self, topic: &str, message: &OutboundMessage) -> Result<(), CycleError> {
            let mut log = self.log.lock().unwrap();
            log.attempted.push(message.attribute.1.clone());
            log.attempted_at.push(tokio::time::Instant::now());
            if self.fail {
                return Err(CycleError::Send {
                    topic: topic.to_string(),
                    reason: "rejected".into(),
                });
            }
            log.delivered.push((topic.to_string(), message.clone()));
            Ok(())
        }

        async fn close(self: Box<Self>) {
            let mut log = self.log.lock().unwrap();
            log.closed += 1;
            log.open_now -= 1;
        }
    }

    fn runner_with(
        broker: RecordingBroker,
        interval: Duration,
    ) -> (QuoteCycleRunner<ScriptedJitter>, Arc<Mutex<Recorder>>, Arc<RuntimeMetrics>) {
        let log = broker.log.clone();
        let metrics = Arc::new(RuntimeMetrics::default());
        let runner = QuoteCycleRunner::new(
            Arc::new(broker),
            QuoteSynthesizer::new("test-gen", ScriptedJitter::new([0, 5, 10, 15, 20])),
            "cotacoes",
            interval,
            metrics.clone(),
        );
        (runner, log, metrics)
    }

    /// Token that is never cancelled.
    fn live() -> CancellationToken {
        CancellationToken::new()
    }

    /// Broker whose connect never resolves.
    struct HangingBroker;

    #[async_trait::async_trait]
    impl Broker for HangingBroker {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn connect(&self) -> Result<Box<dyn Publisher>, CycleError> {
            std::future::pending().await
        }
    }

    fn decode(message: &OutboundMessage) -> Quote {
        serde_json::from_slice(&message.body).unwrap()
    }

    // --------------------------------------------------------
    // Rotation
    // --------------------------------------------------------

    #[tokio::test]
    async fn currencies_rotate_in_table_order() {
        let (mut runner, log, _) = runner_with(RecordingBroker::default(), Duration::ZERO);

        for _ in 0..7 {
            runner.run_cycle(&live()).await;
        }

        let log = log.lock().unwrap();
        assert_eq!(log.attempted, ["USD", "EUR", "LIB", "USD", "EUR", "LIB", "USD"]);
    }

    #[tokio::test]
    async fn failed_send_keeps_rotation_going() {
        let broker = RecordingBroker::failing(&[], &[2]);
        let (mut runner, log, metrics) = runner_with(broker, Duration::ZERO);

        for _ in 0..6 {
            runner.run_cycle(&live()).await;
        }

        let log = log.lock().unwrap();
        assert_eq!(log.attempted, ["USD", "EUR", "LIB", "USD", "EUR", "LIB"]);
        let delivered: Vec<_> = log.delivered.iter().map(|(_, m)| m.attribute.1.as_str()).collect();
        assert_eq!(delivered, ["USD", "LIB", "USD", "EUR", "LIB"]);

        assert_eq!(metrics.send_errors.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.quotes_published.load(Ordering::Relaxed), 5);
    }

    #[tokio::test]
    async fn connect_failure_still_advances_cursor() {
        let broker = RecordingBroker::failing(&[1], &[]);
        let (mut runner, log, metrics) = runner_with(broker, Duration::ZERO);

        runner.run_cycle(&live()).await;
        assert_eq!(runner.state.cursor(), 1);

        runner.run_cycle(&live()).await;
        runner.run_cycle(&live()).await;
        runner.run_cycle(&live()).await;

        let log = log.lock().unwrap();
        assert_eq!(log.attempted, ["EUR", "LIB", "USD"]);
        assert_eq!(metrics.connect_errors.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.cycles_started.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn wrap_follows_custom_table_size() {
        static PAIR: [Currency; 2] = [USD, EUR];
        let broker = RecordingBroker::default();
        let log = broker.log.clone();
        let mut runner = QuoteCycleRunner::with_currencies(
            Arc::new(broker),
            QuoteSynthesizer::new("test-gen", ScriptedJitter::new([1])),
            "cotacoes",
            Duration::ZERO,
            Arc::new(RuntimeMetrics::default()),
            &PAIR,
        );

        for _ in 0..5 {
            runner.run_cycle(&live()).await;
        }

        assert_eq!(log.lock().unwrap().attempted, ["USD", "EUR", "USD", "EUR", "USD"]);
    }

    // --------------------------------------------------------
    // Resource discipline
    // --------------------------------------------------------

    #[tokio::test]
    async fn every_opened_publisher_is_closed_once() {
        let broker = RecordingBroker::failing(&[3], &[1, 2, 5]);
        let (mut runner, log, metrics) = runner_with(broker, Duration::ZERO);

        for _ in 0..6 {
            runner.run_cycle(&live()).await;
        }

        let log = log.lock().unwrap();
        assert_eq!(log.connect_attempts, 6);
        assert_eq!(log.opened, 5);
        assert_eq!(log.closed, 5);
        assert_eq!(log.open_now, 0);
        assert_eq!(log.max_open, 1);
        assert_eq!(
            metrics.publishers_acquired.load(Ordering::Relaxed),
            metrics.publishers_released.load(Ordering::Relaxed)
        );
    }

    // --------------------------------------------------------
    // Message contents
    // --------------------------------------------------------

    #[tokio::test]
    async fn message_attribute_matches_body_symbol() {
        let (mut runner, log, _) = runner_with(RecordingBroker::default(), Duration::ZERO);

        for _ in 0..3 {
            runner.run_cycle(&live()).await;
        }

        let log = log.lock().unwrap();
        for (topic, message) in &log.delivered {
            let quote = decode(message);
            assert_eq!(topic, "cotacoes");
            assert_eq!(message.attribute.0, "moeda");
            assert_eq!(message.attribute.1, quote.symbol);
            assert_eq!(quote.source, "test-gen");
        }

        let values: Vec<Decimal> = log.delivered.iter().map(|(_, m)| decode(m).value).collect();
        assert_eq!(values, [Decimal::new(5050, 3), Decimal::new(5275, 3), Decimal::new(6230, 3)]);
    }

    // --------------------------------------------------------
    // Loop timing and cancellation
    // --------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn three_cycles_before_cancel_at_250ms() {
        let broker = RecordingBroker::default();
        let log = broker.log.clone();
        let runner = QuoteCycleRunner::new(
            Arc::new(broker),
            QuoteSynthesizer::new("test-gen", RngJitter::new(StdRng::seed_from_u64(3))),
            "cotacoes",
            Duration::from_millis(100),
            Arc::new(RuntimeMetrics::default()),
        );
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(250)).await;
                token.cancel();
            })
        };
        runner.run(token).await;
        canceller.await.unwrap();

        let log = log.lock().unwrap();
        let symbols: Vec<_> = log.delivered.iter().map(|(_, m)| m.attribute.1.as_str()).collect();
        assert_eq!(symbols, ["USD", "EUR", "LIB"]);

        let band = Decimal::new(20, 3);
        for ((_, message), currency) in log.delivered.iter().zip(CURRENCIES.iter()) {
            let quote = decode(message);
            assert!(quote.value >= currency.base_value);
            assert!(quote.value <= currency.base_value + band);
            assert_eq!(quote.value.scale(), 3);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_wait_stops_before_next_cycle() {
        let (runner, log, _) = runner_with(RecordingBroker::default(), Duration::from_secs(10));
        let token = CancellationToken::new();
        let started = tokio::time::Instant::now();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                sleep(Duration::from_secs(1)).await;
                token.cancel();
            })
        };
        runner.run(token).await;
        canceller.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(log.lock().unwrap().attempted, ["USD"]);
    }

    #[tokio::test]
    async fn cancelled_token_runs_no_cycle() {
        let (runner, log, metrics) = runner_with(RecordingBroker::default(), Duration::from_secs(1));
        let token = CancellationToken::new();
        token.cancel();

        runner.run(token).await;

        assert_eq!(log.lock().unwrap().connect_attempts, 0);
        assert_eq!(metrics.cycles_started.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_end_the_loop() {
        let broker = RecordingBroker::failing(&[1, 2], &[3]);
        let (runner, log, metrics) = runner_with(broker, Duration::from_millis(100));
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(450)).await;
                token.cancel();
            })
        };
        runner.run(token).await;
        canceller.await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.connect_attempts, 5);
        assert_eq!(log.attempted, ["LIB", "USD", "EUR"]);
        assert_eq!(metrics.cycle_failures.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn three_cycles_complete_within_350ms() {
        let (runner, log, _) = runner_with(RecordingBroker::default(), Duration::from_millis(100));
        let token = CancellationToken::new();
        let started = tokio::time::Instant::now();
        let window = Duration::from_millis(350);

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                sleep(window).await;
                token.cancel();
            })
        };
        runner.run(token).await;
        canceller.await.unwrap();

        // A cycle is complete once its publish and its wait are both over.
        let log = log.lock().unwrap();
        let completed = log
            .attempted_at
            .iter()
            .filter(|at| at.duration_since(started) + Duration::from_millis(100) <= window)
            .count();
        assert_eq!(completed, 3);
        assert_eq!(log.attempted[..3], ["USD", "EUR", "LIB"]);
        for (_, message) in &log.delivered {
            assert_eq!(message.attribute.1, decode(message).symbol);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_acquiring_stops_the_runner() {
        let metrics = Arc::new(RuntimeMetrics::default());
        let runner = QuoteCycleRunner::new(
            Arc::new(HangingBroker),
            QuoteSynthesizer::new("test-gen", ScriptedJitter::new([0])),
            "cotacoes",
            Duration::from_millis(100),
            metrics.clone(),
        );
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(50)).await;
                token.cancel();
            })
        };
        tokio::time::timeout(Duration::from_secs(3600), runner.run(token))
            .await
            .expect("runner kept waiting on the broker after shutdown");
        canceller.await.unwrap();

        assert_eq!(metrics.cycles_started.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.publishers_acquired.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.quotes_published.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.cycle_failures.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn abandoned_cycle_sends_nothing_and_keeps_cursor() {
        let (mut runner, log, _) = runner_with(RecordingBroker::default(), Duration::ZERO);
        let token = CancellationToken::new();
        token.cancel();

        runner.run_cycle(&token).await;

        assert_eq!(runner.state.cursor(), 0);
        let log = log.lock().unwrap();
        assert_eq!(log.connect_attempts, 0);
        assert!(log.attempted.is_empty());
    }
}
