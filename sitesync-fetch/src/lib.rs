//! Resilient, paginated fetching of CMS collections.
//!
//! Every endpoint goes through one [`RetryPolicy`]; partial collections are
//! never returned. Endpoints are fetched concurrently on the blocking pool.

pub mod checkpoint;
pub mod error;
pub mod fetcher;
pub mod media;
pub mod retry;
pub mod state;
pub mod transport;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinSet;

use sitesync_core::ContentKind;

pub use error::FetchError;
pub use fetcher::{FetchOptions, Fetcher};
pub use media::resolve_media;
pub use retry::RetryPolicy;
pub use state::SyncState;
pub use transport::{HttpResponse, Transport, TransportError, UreqTransport};

/// Raw items per kind plus the merged request counters.
#[derive(Debug, Default)]
pub struct FetchedContent {
    pub raw: BTreeMap<ContentKind, Vec<Value>>,
    pub state: SyncState,
}

/// Fetch every endpoint in `kinds` concurrently. The first failure aborts the
/// run; remaining tasks are cancelled when the set is dropped.
pub async fn fetch_endpoints(
    fetcher: Arc<Fetcher>,
    kinds: &[ContentKind],
) -> Result<FetchedContent, FetchError> {
    let mut set = JoinSet::new();
    for &kind in kinds {
        let fetcher = Arc::clone(&fetcher);
        set.spawn_blocking(move || {
            let mut state = SyncState::default();
            let result = fetcher.fetch_all(kind.endpoint(), &mut state);
            (kind, result, state)
        });
    }

    let mut fetched = FetchedContent::default();
    while let Some(joined) = set.join_next().await {
        let (kind, result, state) = joined.map_err(|err| FetchError::Join(err.to_string()))?;
        let items = result?;
        tracing::info!(endpoint = kind.endpoint(), items = items.len(), "endpoint complete");
        fetched.state.merge(state);
        fetched.raw.insert(kind, items);
    }
    Ok(fetched)
}
