//! The streaming adapter.
//!
//! [`VwStream`] launches the engine, encodes examples onto its input, and
//! turns its output back into [`Prediction`]s. The write side and the read
//! side are separate handles ([`StreamWriter`] implements [`ExampleSink`],
//! [`StreamReader`] implements [`PredictionSource`]) so they can live in
//! different tasks; the correlation table is the only state they share.
//!
//! ```no_run
//! # use vwstream_core::{Example, StreamConfig, VwStream};
//! # async fn demo() -> vwstream_core::Result<()> {
//! let (writer, mut reader) = VwStream::spawn(StreamConfig::default()).await?.split();
//! writer.send(Example::new(1.0).with_feature("price", 0.23)).await?;
//! writer.close();
//! while let Some(prediction) = reader.next_prediction().await {
//!     let prediction = prediction?;
//!     println!("{} -> {}", prediction.sequence, prediction.prediction);
//! }
//! println!("average loss {}", reader.average_loss());
//! # Ok(())
//! # }
//! ```

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::codec::{save_directive, ExampleEncoder};
use crate::config::{SnapshotConfig, StreamConfig};
use crate::correlation::{CorrelationTable, StreamStats};
use crate::error::{Error, Result};
use crate::example::{Example, Prediction};
use crate::namespace::NamespaceAllocator;
use crate::snapshot::SnapshotPoller;
use crate::transport::{EngineTransport, TransportState};

/// Accepts examples for the engine.
#[async_trait]
pub trait ExampleSink: Send + Sync {
    /// Submit one example, returning the sequence number that will tag its
    /// prediction. Waits while the engine's input queue is full.
    async fn send(&self, example: Example) -> Result<u64>;

    /// No more examples will be sent.
    fn close(&self);
}

/// Yields predictions in arrival order; `None` marks the end of the stream.
#[async_trait]
pub trait PredictionSource: Send {
    async fn next_prediction(&mut self) -> Option<Result<Prediction>>;
}

struct Shared {
    table: Mutex<CorrelationTable>,
    encoder: Mutex<ExampleEncoder>,
    transport: EngineTransport,
    snapshot: SnapshotConfig,
}

impl Shared {
    async fn send(&self, example: Example) -> Result<u64> {
        if self.transport.state() >= TransportState::InputClosed {
            return Err(Error::TransportClosedWrite);
        }

        // Lock order: table, then encoder
        let (sequence, line) = {
            let mut table = self.table.lock();
            let line = self.encoder.lock().encode(&example, table.next_sequence())?;
            (table.on_send(example), line)
        };

        debug!("VW(sendExample): {}", line);
        if let Err(e) = self.transport.send_line(line).await {
            self.table.lock().abandon(sequence);
            return Err(e);
        }
        Ok(sequence)
    }

    async fn snapshot(&self, timeout: Duration) -> Result<Vec<u8>> {
        match self.transport.state() {
            TransportState::Starting | TransportState::Running => {
                // One budget covers queueing the directive and polling
                let deadline = Instant::now() + timeout;
                let path = self.transport.next_snapshot_path();
                debug!("Saving live model file: {}", path.display());

                let directive = save_directive(&path.display().to_string());
                tokio::time::timeout_at(deadline, self.transport.send_line(directive))
                    .await
                    .map_err(|_| {
                        warn!("Engine input stalled while queueing save directive");
                        Error::SnapshotTimeout {
                            path: path.clone(),
                            waited: timeout,
                        }
                    })??;

                let remaining = deadline.saturating_duration_since(Instant::now());
                SnapshotPoller::new(path, self.snapshot.poll_interval(), remaining)
                    .wait()
                    .await
            }
            TransportState::InputClosed => {
                // The engine writes its final model on the way out
                tokio::time::timeout(timeout, self.transport.wait_exited())
                    .await
                    .map_err(|_| Error::SnapshotTimeout {
                        path: self.transport.final_model_path().to_path_buf(),
                        waited: timeout,
                    })?;
                self.final_model()
            }
            TransportState::Exited => self.final_model(),
        }
    }

    fn final_model(&self) -> Result<Vec<u8>> {
        self.transport.final_model().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "engine exited without writing a final model",
            ))
        })
    }
}

/// Adapter owning one engine process.
pub struct VwStream {
    writer: StreamWriter,
    reader: StreamReader,
}

impl VwStream {
    /// Launch the engine with logs scoped to a fresh `vwstream` span.
    pub async fn spawn(config: StreamConfig) -> Result<Self> {
        Self::spawn_in(config, tracing::info_span!("vwstream")).await
    }

    /// Launch the engine; every background task logs inside `span`.
    pub async fn spawn_in(config: StreamConfig, span: Span) -> Result<Self> {
        let mut namespaces = NamespaceAllocator::new();
        let (transport, lines) =
            EngineTransport::launch(&config, &mut namespaces, span.clone()).await?;

        let shared = Arc::new(Shared {
            table: Mutex::new(CorrelationTable::new(
                config.loss_function.clone(),
                config.quantile_tau,
            )),
            encoder: Mutex::new(ExampleEncoder::new(namespaces)),
            transport,
            snapshot: config.snapshot.clone(),
        });

        let (results_tx, results_rx) = mpsc::unbounded_channel();
        tokio::spawn(correlate(shared.clone(), lines, results_tx).instrument(span));

        Ok(Self {
            writer: StreamWriter {
                shared: shared.clone(),
            },
            reader: StreamReader {
                shared,
                results: results_rx,
            },
        })
    }

    /// Separate the write and read sides.
    pub fn split(self) -> (StreamWriter, StreamReader) {
        (self.writer, self.reader)
    }

    pub async fn send(&self, example: Example) -> Result<u64> {
        self.writer.send(example).await
    }

    pub fn close(&self) {
        self.writer.close()
    }

    pub async fn next_prediction(&mut self) -> Option<Result<Prediction>> {
        self.reader.next_prediction().await
    }

    pub async fn snapshot(&self) -> Result<Vec<u8>> {
        self.writer.snapshot().await
    }

    pub async fn snapshot_with_timeout(&self, timeout: Duration) -> Result<Vec<u8>> {
        self.writer.snapshot_with_timeout(timeout).await
    }

    pub fn average_loss(&self) -> f64 {
        self.writer.average_loss()
    }

    pub fn stats(&self) -> StreamStats {
        self.writer.stats()
    }

    pub fn state(&self) -> TransportState {
        self.writer.state()
    }
}

/// Write side of the adapter.
#[derive(Clone)]
pub struct StreamWriter {
    shared: Arc<Shared>,
}

impl StreamWriter {
    pub async fn send(&self, example: Example) -> Result<u64> {
        self.shared.send(example).await
    }

    pub fn close(&self) {
        self.shared.transport.close_input();
    }

    /// Current model bytes, within the configured snapshot budget.
    pub async fn snapshot(&self) -> Result<Vec<u8>> {
        self.shared.snapshot(self.shared.snapshot.timeout()).await
    }

    pub async fn snapshot_with_timeout(&self, timeout: Duration) -> Result<Vec<u8>> {
        self.shared.snapshot(timeout).await
    }

    pub async fn wait_exited(&self) {
        self.shared.transport.wait_exited().await
    }

    pub fn average_loss(&self) -> f64 {
        self.shared.table.lock().aggregate().average()
    }

    pub fn stats(&self) -> StreamStats {
        self.shared.table.lock().stats()
    }

    pub fn state(&self) -> TransportState {
        self.shared.transport.state()
    }
}

#[async_trait]
impl ExampleSink for StreamWriter {
    async fn send(&self, example: Example) -> Result<u64> {
        StreamWriter::send(self, example).await
    }

    fn close(&self) {
        StreamWriter::close(self)
    }
}

/// Read side of the adapter.
pub struct StreamReader {
    shared: Arc<Shared>,
    results: mpsc::UnboundedReceiver<Result<Prediction>>,
}

impl StreamReader {
    pub async fn next_prediction(&mut self) -> Option<Result<Prediction>> {
        self.results.recv().await
    }

    /// Model bytes; after the stream has ended this is the final model.
    pub async fn snapshot(&self) -> Result<Vec<u8>> {
        self.shared.snapshot(self.shared.snapshot.timeout()).await
    }

    pub fn average_loss(&self) -> f64 {
        self.shared.table.lock().aggregate().average()
    }

    pub fn stats(&self) -> StreamStats {
        self.shared.table.lock().stats()
    }

    /// Sequence numbers that never received a prediction before the engine
    /// exited.
    pub fn unresolved(&self) -> Vec<u64> {
        self.shared.table.lock().unresolved().to_vec()
    }

    /// True once the engine has exited and nothing is left pending.
    pub fn is_complete(&self) -> bool {
        let exited = self.shared.transport.state() == TransportState::Exited;
        self.shared.table.lock().is_complete(exited)
    }
}

#[async_trait]
impl PredictionSource for StreamReader {
    async fn next_prediction(&mut self) -> Option<Result<Prediction>> {
        StreamReader::next_prediction(self).await
    }
}

impl Stream for StreamReader {
    type Item = Result<Prediction>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.results.poll_recv(cx)
    }
}

/// Feed engine output through the correlation table until the engine is gone.
async fn correlate(
    shared: Arc<Shared>,
    mut lines: mpsc::UnboundedReceiver<String>,
    results: mpsc::UnboundedSender<Result<Prediction>>,
) {
    let mut failed = false;

    while let Some(line) = lines.recv().await {
        if failed {
            debug!("VW(STDOUT, discarded): {}", line);
            continue;
        }

        let outcome = shared.table.lock().on_line(&line);
        match outcome {
            Ok(Some(prediction)) => {
                let _ = results.send(Ok(prediction));
            }
            Ok(None) => {}
            Err(Error::UnknownSequenceNumber(sequence)) => {
                warn!("Dropping prediction for unknown sequence number {}", sequence);
            }
            Err(e) => {
                error!("Cannot correlate engine output: {}", e);
                failed = true;
                shared.transport.close_input();
                let _ = results.send(Err(e));
            }
        }
    }

    let unresolved = shared.table.lock().close_unresolved();
    if unresolved.is_empty() {
        debug!("VW(end)");
    } else {
        warn!(
            count = unresolved.len(),
            "Engine exited before predicting every example"
        );
    }
    info!(stats = ?shared.table.lock().stats(), "Prediction stream finished");
}
