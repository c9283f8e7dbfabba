//! Featured-media resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::task::JoinSet;

use sitesync_core::MediaRecord;

use crate::fetcher::Fetcher;
use crate::state::SyncState;

/// Look up every distinct id, `batch_size` at a time. A failed lookup is
/// logged and skipped; the post simply renders without its image.
pub async fn resolve_media(
    fetcher: Arc<Fetcher>,
    ids: impl IntoIterator<Item = u64>,
    batch_size: usize,
) -> (BTreeMap<u64, MediaRecord>, SyncState) {
    let ids: Vec<u64> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
    let mut media = BTreeMap::new();
    let mut state = SyncState::default();
    if ids.is_empty() {
        return (media, state);
    }
    tracing::info!(count = ids.len(), "resolving featured media");

    for batch in ids.chunks(batch_size.max(1)) {
        let mut set = JoinSet::new();
        for &id in batch {
            let fetcher = Arc::clone(&fetcher);
            set.spawn_blocking(move || {
                let mut local = SyncState::default();
                let result = fetcher.fetch_media(id, &mut local);
                (id, result, local)
            });
        }
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, result, local)) => {
                    state.merge(local);
                    match result {
                        Ok(Some(record)) => {
                            media.insert(id, record);
                        }
                        Ok(None) => tracing::debug!(id, "media not found"),
                        Err(err) => tracing::warn!(id, error = %err, "media lookup failed, skipping"),
                    }
                }
                Err(err) => tracing::warn!(error = %err, "media task failed"),
            }
        }
    }

    tracing::info!(resolved = media.len(), requested = ids.len(), "featured media resolved");
    (media, state)
}
