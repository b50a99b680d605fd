//! TTL cache over the engine's narrator list, with single-flight refresh.
//!
//! Concurrent callers hitting a stale cache all await the same in-flight
//! fetch; a fetch either fully replaces the set or leaves it untouched. A
//! failed fetch leaves the cache empty and stale so the next lookup retries
//! instead of serving permanently wrong data.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::Shared;
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::Result;

/// Where the narrator list comes from. The synthesis engine implements this
/// over its list-narrators invocation; tests substitute fakes.
#[async_trait]
pub trait SpeakerSource: Send + Sync {
    async fn fetch_speakers(&self) -> Result<HashSet<String>>;
}

type SharedFetch = Shared<Pin<Box<dyn Future<Output = Arc<HashSet<String>>> + Send>>>;

#[derive(Clone)]
pub struct SpeakerCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    source: Arc<dyn SpeakerSource>,
    ttl: Duration,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    names: Arc<HashSet<String>>,
    fetched_at: Option<Instant>,
    inflight: Option<SharedFetch>,
}

impl SpeakerCache {
    pub fn new(source: Arc<dyn SpeakerSource>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                source,
                ttl,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Cached set when fresh, otherwise start or join the single in-flight
    /// fetch. All concurrent callers observe the identical result.
    pub async fn get(&self) -> Arc<HashSet<String>> {
        let fetch = {
            let mut state = self.inner.state.lock().await;
            if let Some(at) = state.fetched_at {
                if at.elapsed() < self.inner.ttl {
                    return Arc::clone(&state.names);
                }
            }
            self.start_or_join_fetch(&mut state)
        };
        fetch.await
    }

    /// Invalidate and reload through the same single-flight path.
    pub async fn refresh(&self) -> Arc<HashSet<String>> {
        debug!(target: "speakers", "forced refresh");
        let fetch = {
            let mut state = self.inner.state.lock().await;
            state.fetched_at = None;
            self.start_or_join_fetch(&mut state)
        };
        fetch.await
    }

    /// Validity of a caller-supplied narrator name. Absent names are valid
    /// (the field is optional). An empty set means the list is currently
    /// unverifiable; names are then not rejected.
    pub async fn is_valid(&self, name: Option<&str>) -> bool {
        let Some(name) = name else {
            return true;
        };
        let names = self.get().await;
        names.is_empty() || names.contains(name)
    }

    fn start_or_join_fetch(&self, state: &mut CacheState) -> SharedFetch {
        if let Some(fetch) = &state.inflight {
            return fetch.clone();
        }

        let inner = Arc::clone(&self.inner);
        let fut: Pin<Box<dyn Future<Output = Arc<HashSet<String>>> + Send>> =
            Box::pin(async move {
                let fetched = inner.source.fetch_speakers().await;
                let mut state = inner.state.lock().await;
                state.inflight = None;
                match fetched {
                    Ok(names) => {
                        info!(target: "speakers", count = names.len(), "narrator list refreshed");
                        state.names = Arc::new(names);
                        state.fetched_at = Some(Instant::now());
                    }
                    Err(err) => {
                        // Empty, not stale-poisoned: fetched_at stays unset
                        // so the next lookup retries.
                        warn!(
                            target: "speakers",
                            error = %err,
                            "narrator list fetch failed; cache left empty"
                        );
                        state.names = Arc::new(HashSet::new());
                        state.fetched_at = None;
                    }
                }
                Arc::clone(&state.names)
            });

        let shared = fut.shared();
        state.inflight = Some(shared.clone());
        shared
    }
}
