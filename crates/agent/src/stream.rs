//! The loop as an event stream.
//!
//! [`TurnEventStream`] yields every [`TurnEvent`] of one run in execution
//! order and ends when the run ends. The run outcome is available through
//! [`TurnEventStream::finish`], which may be called before the stream is
//! drained; unread events are dropped.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use turnloop_core::TurnEvent;

use crate::error::AgentError;
use crate::turn::RunSummary;

pub struct TurnEventStream {
    events: UnboundedReceiverStream<TurnEvent>,
    handle: JoinHandle<Result<RunSummary, AgentError>>,
}

impl TurnEventStream {
    pub(crate) fn new(
        events: UnboundedReceiver<TurnEvent>,
        handle: JoinHandle<Result<RunSummary, AgentError>>,
    ) -> Self {
        Self {
            events: UnboundedReceiverStream::new(events),
            handle,
        }
    }

    /// Wait for the run to end and return its outcome.
    pub async fn finish(self) -> Result<RunSummary, AgentError> {
        match self.handle.await {
            Ok(outcome) => outcome,
            // Panics are caught inside the run; only cancellation lands here.
            Err(join) => Err(AgentError::new(
                0,
                turnloop_core::Error::Internal(format!("turn loop task failed: {join}")),
            )),
        }
    }

    /// Drain every event, then return them with the run outcome.
    pub async fn collect_all(mut self) -> (Vec<TurnEvent>, Result<RunSummary, AgentError>) {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        let outcome = self.finish().await;
        (events, outcome)
    }
}

impl Stream for TurnEventStream {
    type Item = TurnEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}
