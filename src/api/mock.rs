use super::NowPlayingSource;
use crate::error::UpstreamError;
use crate::models::NowPlayingState;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// A fixed-answer source used in tests and local UI work without credentials.
pub struct StaticSource {
    answer: Result<NowPlayingState, u16>,
    calls: AtomicUsize,
}

impl StaticSource {
    /// Always answer with `state`.
    pub fn new(state: NowPlayingState) -> Self {
        Self { answer: Ok(state), calls: AtomicUsize::new(0) }
    }

    /// Always fail as if the provider answered with `status`.
    pub fn failing(status: u16) -> Self {
        Self { answer: Err(status), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NowPlayingSource for StaticSource {
    async fn fetch_now_playing(&self) -> Result<NowPlayingState, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        info!("StaticSource: fetch_now_playing");
        match &self.answer {
            Ok(state) => Ok(state.clone()),
            Err(status) => Err(UpstreamError::Status(*status)),
        }
    }

    fn name(&self) -> &str {
        "static"
    }
}
