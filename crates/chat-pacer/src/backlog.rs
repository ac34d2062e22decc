//! FIFO between the drain task (producer) and the pacing loop (consumer).
//!
//! Chunks travel over an unbounded mpsc channel. The drain task reports how
//! the upstream ended over a separate oneshot so a failure reaches the pacing
//! loop without queueing behind buffered chunks.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::chunk::ChatChunk;
use crate::errors::{ClientError, ProviderError};

/// Creates a connected writer/reader pair.
pub(crate) fn channel() -> (BacklogWriter, Backlog) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (outcome_tx, outcome_rx) = oneshot::channel();
    (
        BacklogWriter { tx, outcome_tx },
        Backlog {
            rx,
            outcome_rx,
            upstream: Upstream::Live,
        },
    )
}

/// Push side, owned by the drain task.
pub(crate) struct BacklogWriter {
    tx: mpsc::UnboundedSender<ChatChunk>,
    outcome_tx: oneshot::Sender<Result<(), ProviderError>>,
}

impl BacklogWriter {
    /// Appends a chunk at the tail. Returns `false` once the reader is gone.
    pub(crate) fn push(&self, chunk: ChatChunk) -> bool {
        self.tx.send(chunk).is_ok()
    }

    /// Records how the upstream ended. Must follow the last `push`.
    pub(crate) fn finish(self, outcome: Result<(), ProviderError>) {
        let _ = self.outcome_tx.send(outcome);
    }
}

#[derive(Debug)]
enum Upstream {
    Live,
    Exhausted,
    Failed(Option<ClientError>),
}

/// Result of [`Backlog::pop_or_wait`].
#[derive(Debug)]
pub(crate) enum Pop {
    /// Head chunk removed.
    Chunk(ChatChunk),
    /// Nothing buffered yet and upstream still live; the wait elapsed.
    Idle,
    /// Upstream finished and every chunk has been popped.
    Exhausted,
    /// Upstream failed. Buffered chunks are discarded.
    Failed(ClientError),
}

/// Pop side, owned by the pacing loop.
pub(crate) struct Backlog {
    rx: mpsc::UnboundedReceiver<ChatChunk>,
    outcome_rx: oneshot::Receiver<Result<(), ProviderError>>,
    upstream: Upstream,
}

enum Wake {
    Settled(Result<Result<(), ProviderError>, oneshot::error::RecvError>),
    Pushed(Option<ChatChunk>),
    Elapsed,
}

impl Backlog {
    /// Number of chunks buffered and not yet popped.
    pub(crate) fn depth(&self) -> usize {
        self.rx.len()
    }

    /// `true` once upstream ended without error.
    pub(crate) fn is_exhausted(&self) -> bool {
        matches!(self.upstream, Upstream::Exhausted)
    }

    /// Resolves once the drain task has reported the upstream outcome.
    ///
    /// Returns immediately when the outcome is already known. Cancel safe.
    pub(crate) async fn settled(&mut self) {
        if matches!(self.upstream, Upstream::Live) {
            let outcome = (&mut self.outcome_rx).await;
            self.record(outcome);
        }
    }

    /// Removes the head chunk, waiting at most `wait` for one to arrive while
    /// upstream is still live. Cancel safe.
    pub(crate) async fn pop_or_wait(&mut self, wait: Duration) -> Pop {
        if matches!(self.upstream, Upstream::Live) {
            let wake = tokio::select! {
                biased;
                outcome = &mut self.outcome_rx => Wake::Settled(outcome),
                chunk = self.rx.recv() => Wake::Pushed(chunk),
                _ = tokio::time::sleep(wait) => Wake::Elapsed,
            };
            match wake {
                Wake::Settled(outcome) => self.record(outcome),
                Wake::Pushed(Some(chunk)) => return Pop::Chunk(chunk),
                // The sender only drops after the outcome is sent, so a closed
                // channel here means the drain task vanished.
                Wake::Pushed(None) => {
                    let outcome = (&mut self.outcome_rx).await;
                    self.record(outcome);
                }
                Wake::Elapsed => return Pop::Idle,
            }
        }

        match &mut self.upstream {
            Upstream::Live => Pop::Idle,
            Upstream::Exhausted => match self.rx.try_recv() {
                Ok(chunk) => Pop::Chunk(chunk),
                Err(_) => Pop::Exhausted,
            },
            Upstream::Failed(error) => Pop::Failed(error.take().unwrap_or_else(|| {
                ClientError::protocol_msg("backlog polled after upstream failure")
            })),
        }
    }

    fn record(&mut self, outcome: Result<Result<(), ProviderError>, oneshot::error::RecvError>) {
        self.upstream = match outcome {
            Ok(Ok(())) => Upstream::Exhausted,
            Ok(Err(error)) => {
                self.rx.close();
                Upstream::Failed(Some(ClientError::Provider(error)))
            }
            Err(_) => {
                self.rx.close();
                Upstream::Failed(Some(ClientError::protocol_msg(
                    "drain task ended without reporting an upstream outcome",
                )))
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::RawEvent;
    use crate::normalize::normalize_event;

    const WAIT: Duration = Duration::from_millis(10);

    fn chunk(text: &str) -> ChatChunk {
        normalize_event(&RawEvent::text(text, 0, text), "m")
    }

    #[tokio::test(start_paused = true)]
    async fn pops_in_push_order_and_reports_depth() {
        let (writer, mut backlog) = channel();
        assert!(writer.push(chunk("a")));
        assert!(writer.push(chunk("b")));
        assert_eq!(backlog.depth(), 2);

        let Pop::Chunk(first) = backlog.pop_or_wait(WAIT).await else {
            panic!("expected first chunk");
        };
        assert_eq!(first.text(), "a");
        assert_eq!(backlog.depth(), 1);
        let Pop::Chunk(second) = backlog.pop_or_wait(WAIT).await else {
            panic!("expected second chunk");
        };
        assert_eq!(second.text(), "b");
        drop(writer);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_live_backlog_idles_for_the_wait() {
        let (_writer, mut backlog) = channel();
        let started = tokio::time::Instant::now();
        assert!(matches!(backlog.pop_or_wait(WAIT).await, Pop::Idle));
        assert!(started.elapsed() >= WAIT);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_backlog_flushes_remaining_then_ends() {
        let (writer, mut backlog) = channel();
        writer.push(chunk("a"));
        writer.push(chunk("b"));
        writer.finish(Ok(()));

        let mut texts = Vec::new();
        loop {
            match backlog.pop_or_wait(WAIT).await {
                Pop::Chunk(chunk) => texts.push(chunk.text()),
                Pop::Exhausted => break,
                other => panic!("unexpected pop: {other:?}"),
            }
        }
        assert_eq!(texts, ["a", "b"]);
        assert!(backlog.is_exhausted());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_discards_buffered_chunks() {
        let (writer, mut backlog) = channel();
        writer.push(chunk("a"));
        writer.finish(Err(ProviderError::transport("p", "reset")));

        match backlog.pop_or_wait(WAIT).await {
            Pop::Failed(ClientError::Provider(ProviderError::Transport { message, .. })) => {
                assert_eq!(message, "reset");
            }
            other => panic!("unexpected pop: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_drain_task_is_a_protocol_failure() {
        let (writer, mut backlog) = channel();
        drop(writer);
        assert!(matches!(
            backlog.pop_or_wait(WAIT).await,
            Pop::Failed(ClientError::Protocol(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn settled_resolves_when_outcome_arrives() {
        let (writer, mut backlog) = channel();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.finish(Ok(()));
        });
        backlog.settled().await;
        assert!(backlog.is_exhausted());
        handle.await.expect("join");
    }
}
