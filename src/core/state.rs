use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::ai_extraction::AiExtractionService;
use crate::services::change_feed::ChangeFeed;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    extraction: AiExtractionService,
    feed: ChangeFeed,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        extraction: AiExtractionService,
    ) -> Self {
        let feed = ChangeFeed::new(settings.exam().live_channel_capacity);
        Self { inner: Arc::new(InnerState { settings, db, redis, extraction, feed }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn extraction(&self) -> &AiExtractionService {
        &self.inner.extraction
    }

    pub(crate) fn feed(&self) -> &ChangeFeed {
        &self.inner.feed
    }
}
