//! Paced chat stream: drain task, pacing loop and cancellation handle.

use std::time::Duration;

use futures::StreamExt as _;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backlog::{self, Backlog, BacklogWriter, Pop};
use crate::chunk::ChatChunk;
use crate::errors::ClientError;
use crate::normalize::normalize_event;
use crate::pacing::{PacingConfig, PacingState};
use crate::provider::RawEventStream;

/// Handle used to request cancellation of a paced stream.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// The upstream call is dropped and the stream ends with
    /// `ClientError::Cancelled` within one poll interval.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }

    /// Returns `true` once `abort` has been called.
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

enum Delay {
    Aborted,
    Settled,
    Elapsed,
}

/// Normalized chat chunks released at a paced cadence.
///
/// Use `next_chunk()` to pull chunks one at a time or `into_stream()` to get a
/// `futures::Stream`. The sequence is finite and ends (`None`) once upstream
/// is exhausted and every buffered chunk has been released.
pub struct ChatStream {
    stream_id: uuid::Uuid,
    model: String,
    backlog: Backlog,
    config: PacingConfig,
    state: PacingState,
    pending_delay: Option<Duration>,
    abort_handle: AbortHandle,
    abort_rx: watch::Receiver<bool>,
    drain: JoinHandle<()>,
    done: bool,
}

impl ChatStream {
    /// Starts pacing `upstream`, labelling every chunk with `model`.
    ///
    /// Spawns the drain task on the current tokio runtime.
    pub fn from_upstream(
        model: impl Into<String>,
        upstream: RawEventStream,
        config: PacingConfig,
    ) -> Self {
        let stream_id = uuid::Uuid::new_v4();
        let model = model.into();
        let (writer, backlog) = backlog::channel();
        let (abort_tx, abort_rx) = watch::channel(false);
        info!(%stream_id, model = %model, "paced stream started");
        let drain = tokio::spawn(drain_upstream(
            stream_id,
            model.clone(),
            upstream,
            writer,
            abort_rx.clone(),
        ));

        Self {
            stream_id,
            model,
            backlog,
            config,
            state: PacingState::default(),
            pending_delay: None,
            abort_handle: AbortHandle { tx: abort_tx },
            abort_rx,
            drain,
            done: false,
        }
    }

    /// Returns the id used to correlate this stream in logs.
    pub fn stream_id(&self) -> uuid::Uuid {
        self.stream_id
    }

    /// Returns the model name stamped on every chunk.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the pacing counters accumulated so far.
    pub fn state(&self) -> &PacingState {
        &self.state
    }

    /// Returns a handle that can cancel the stream.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for and releases the next chunk.
    ///
    /// Returns `None` after the last chunk, after an error, or after
    /// cancellation has been reported.
    pub async fn next_chunk(&mut self) -> Option<Result<ChatChunk, ClientError>> {
        if self.done {
            return None;
        }

        if let Some(delay) = self.pending_delay.take() {
            let woke = tokio::select! {
                biased;
                _ = wait_for_abort(&mut self.abort_rx) => Delay::Aborted,
                _ = self.backlog.settled() => Delay::Settled,
                _ = tokio::time::sleep(delay) => Delay::Elapsed,
            };
            match woke {
                Delay::Aborted => return Some(Err(self.cancelled())),
                Delay::Settled => {
                    debug!(
                        stream_id = %self.stream_id,
                        ?delay,
                        "upstream settled during pacing delay"
                    )
                }
                Delay::Elapsed => {}
            }
        }

        loop {
            let poll_interval = self.config.poll_interval;
            let pop = tokio::select! {
                biased;
                _ = wait_for_abort(&mut self.abort_rx) => None,
                pop = self.backlog.pop_or_wait(poll_interval) => Some(pop),
            };
            let Some(pop) = pop else {
                return Some(Err(self.cancelled()));
            };

            match pop {
                Pop::Chunk(chunk) => return Some(Ok(self.release(chunk))),
                Pop::Idle => {
                    self.state.liveness_waits += 1;
                    debug!(
                        stream_id = %self.stream_id,
                        waits = self.state.liveness_waits,
                        "backlog empty; waiting on upstream"
                    );
                }
                Pop::Exhausted => {
                    self.done = true;
                    self.state.finished = true;
                    info!(
                        stream_id = %self.stream_id,
                        released = self.state.released,
                        tokens_output = self.state.tokens_output,
                        liveness_waits = self.state.liveness_waits,
                        "paced stream finished"
                    );
                    return None;
                }
                Pop::Failed(error) => {
                    self.done = true;
                    warn!(
                        stream_id = %self.stream_id,
                        released = self.state.released,
                        %error,
                        "upstream failed; discarding backlog"
                    );
                    return Some(Err(error));
                }
            }
        }
    }

    /// Drains the stream and concatenates the released content.
    pub async fn collect_text(mut self) -> Result<String, ClientError> {
        let mut text = String::new();
        while let Some(chunk) = self.next_chunk().await {
            text.push_str(&chunk?.text());
        }
        Ok(text)
    }

    /// Converts into a `futures::Stream` of released chunks.
    pub fn into_stream(
        self,
    ) -> impl futures::Stream<Item = Result<ChatChunk, ClientError>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            let item = stream.next_chunk().await?;
            Some((item, stream))
        })
    }

    fn release(&mut self, chunk: ChatChunk) -> ChatChunk {
        let depth = self.backlog.depth();
        self.state.released += 1;
        self.state.tokens_output += chunk.content_len();
        if self.backlog.is_exhausted() {
            self.state.finished = true;
        } else {
            self.pending_delay = Some(self.config.next_delay(depth, self.state.tokens_output));
        }
        debug!(
            stream_id = %self.stream_id,
            seq = self.state.released - 1,
            depth,
            tokens_output = self.state.tokens_output,
            delay = ?self.pending_delay,
            "released chunk"
        );
        chunk
    }

    fn cancelled(&mut self) -> ClientError {
        self.done = true;
        self.pending_delay = None;
        warn!(
            stream_id = %self.stream_id,
            released = self.state.released,
            "paced stream cancelled"
        );
        ClientError::Cancelled
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        if !self.drain.is_finished() {
            self.abort_handle.abort();
        }
    }
}

async fn wait_for_abort(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|aborted| *aborted).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn drain_upstream(
    stream_id: uuid::Uuid,
    model: String,
    mut upstream: RawEventStream,
    writer: BacklogWriter,
    mut abort_rx: watch::Receiver<bool>,
) {
    let mut pushed = 0_usize;
    loop {
        let next = tokio::select! {
            biased;
            _ = wait_for_abort(&mut abort_rx) => {
                debug!(%stream_id, pushed, "drain cancelled; dropping upstream");
                return;
            }
            next = upstream.next() => next,
        };
        match next {
            Some(Ok(event)) => {
                if !writer.push(normalize_event(&event, &model)) {
                    debug!(%stream_id, pushed, "pacing side gone; dropping upstream");
                    return;
                }
                pushed += 1;
            }
            Some(Err(error)) => {
                warn!(
                    %stream_id,
                    provider = %error.provider_id(),
                    pushed,
                    message = error.message(),
                    "upstream event source failed"
                );
                writer.finish(Err(error));
                return;
            }
            None => {
                debug!(%stream_id, pushed, "upstream exhausted");
                writer.finish(Ok(()));
                return;
            }
        }
    }
}
