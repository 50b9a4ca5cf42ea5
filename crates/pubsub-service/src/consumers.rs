//! Queue definitions owned by this service.

use async_trait::async_trait;
use pubsub_core::{
    process_once, ClaimStore, ConsumerContract, ConsumerOptions, MessageError, QueueDefinition,
    QueueOptions, ServiceError, ServiceErrorCode,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[cfg(test)]
#[path = "consumers_tests.rs"]
mod tests;

/// Base name of the movie events queue, before any environment suffix
pub const MOVIE_EVENTS_QUEUE: &str = "movie-events";

/// How long a processed movie event suppresses its duplicates
pub const MOVIE_CLAIM_TTL: Duration = Duration::from_secs(60 * 60);

/// Event published whenever a movie is added or changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieEvent {
    pub movie_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_year: Option<u16>,
}

impl MovieEvent {
    fn claim_key(&self) -> String {
        format!("{}:{}", MOVIE_EVENTS_QUEUE, self.movie_id)
    }

    fn check(&self) -> Result<(), ServiceError> {
        if self.title.trim().is_empty() {
            return Err(ServiceError::new(ServiceErrorCode::ValidationFailed)
                .with_message(format!("movie {} has no title", self.movie_id))
                .recoverable(false));
        }
        Ok(())
    }
}

/// Processes each movie event at most once per claim window
pub struct MovieEventConsumer {
    claims: Arc<dyn ClaimStore>,
    claim_ttl: Duration,
    processed: AtomicU64,
}

impl MovieEventConsumer {
    pub fn new(claims: Arc<dyn ClaimStore>) -> Self {
        Self {
            claims,
            claim_ttl: MOVIE_CLAIM_TTL,
            processed: AtomicU64::new(0),
        }
    }

    /// Events handled to completion since start-up
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    async fn apply(&self, event: &MovieEvent) -> Result<(), ServiceError> {
        event.check()?;
        self.processed.fetch_add(1, Ordering::Relaxed);
        info!(
            movie_id = %event.movie_id,
            title = %event.title,
            "Movie event processed"
        );
        Ok(())
    }
}

#[async_trait]
impl ConsumerContract<MovieEvent> for MovieEventConsumer {
    async fn on_message(&self, message: MovieEvent) -> Result<(), MessageError> {
        let outcome = process_once(
            self.claims.as_ref(),
            &message.claim_key(),
            self.claim_ttl,
            || self.apply(&message),
        )
        .await?;

        if outcome.is_none() {
            debug!(movie_id = %message.movie_id, "Duplicate movie event skipped");
        }
        Ok(())
    }

    fn options(&self) -> ConsumerOptions {
        ConsumerOptions {
            handle_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        }
    }
}

/// The movie events queue, consumed by [`MovieEventConsumer`]
pub fn movie_events_queue(consumer: Arc<MovieEventConsumer>) -> QueueDefinition<MovieEvent> {
    QueueDefinition::<MovieEvent>::from_arc(MOVIE_EVENTS_QUEUE, consumer)
        .with_options(QueueOptions::default().with_max_receive_count(3))
}
