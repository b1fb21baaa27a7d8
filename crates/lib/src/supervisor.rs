//! Listening loop with a fixed-backoff failure boundary.
//!
//! Events are pulled and dispatched strictly one at a time. When a step fails (transport error while
//! listening, resolver error, failed reply) the error is logged, the loop sleeps for the backoff and
//! then subscribes to a fresh event stream. The failed event is not retried.

use crate::channels::TransportError;
use crate::dispatch::{DispatchError, Pipeline};
use crate::event::InboundEvent;
use futures_util::StreamExt;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(100);

fn unexpected_error_message(error: &DispatchError, backoff: Duration) -> String {
    format!(
        "{}\nUnexpected error happened! Retrying in {} seconds.",
        error,
        backoff.as_secs()
    )
}

pub struct Supervisor {
    pipeline: Pipeline,
    backoff: Duration,
}

impl Supervisor {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    async fn step(&self, item: Result<InboundEvent, TransportError>) -> Result<(), DispatchError> {
        let event = item?;
        let outcome = self.pipeline.handle(event).await?;
        log::debug!("supervisor: dispatch finished: {:?}", outcome);
        Ok(())
    }

    /// Listen and dispatch until `shutdown` resolves. Shutdown is observed while waiting for the next
    /// event or backing off; a dispatch already in progress runs to completion first.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let logger = self.pipeline.logger();
        logger.info("Bot started.").await;
        'listening: loop {
            let mut events = self.pipeline.transport().listen();
            let fault = loop {
                let item = tokio::select! {
                    _ = &mut shutdown => break 'listening,
                    item = events.next() => item,
                };
                let Some(item) = item else {
                    break None;
                };
                if let Err(e) = self.step(item).await {
                    break Some(e);
                }
            };
            drop(events);
            match fault {
                Some(e) => {
                    logger.error(unexpected_error_message(&e, self.backoff)).await;
                }
                None => {
                    logger
                        .info(format!(
                            "Event stream ended, resubscribing in {} seconds.",
                            self.backoff.as_secs()
                        ))
                        .await;
                }
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }
        logger.info("Bot stopped.").await;
    }
}
