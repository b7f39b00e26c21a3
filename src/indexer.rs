//! Indexer facade
//!
//! Composes the store, matcher registry, connection pools, task queue, and
//! worker pool, and exposes the control operations the outer shell (HTTP,
//! CLI, cron) drives: refresh the group list, sweep watched groups, watch
//! and unwatch, re-match, and shut down.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::IndexerConfig;
use crate::error::{IndexError, Result};
use crate::matcher::MatcherRegistry;
use crate::planner;
use crate::pool::{PoolSet, RetryConfig};
use crate::store::{Store, StoreStats};
use crate::tasks::{ShutdownHandle, ShutdownSignal, Task, TaskQueue, shutdown_channel};
use crate::worker::Worker;

/// Page size for offline re-matching sweeps
const REMATCH_PAGE: u32 = 256;

/// The fetch-and-index pipeline behind one handle
///
/// # Example
///
/// ```no_run
/// use usedex::{Indexer, IndexerConfig, ServerConfig};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = IndexerConfig::single_server(
///     ServerConfig::tls("news.example.com", "user", "pass"),
/// );
/// let indexer = Indexer::new(config).await?;
///
/// indexer.refresh_groups().await?;
/// indexer.watch("alt.binaries.tv").await?;
/// indexer.refresh_watched(None).await?;
///
/// indexer.shutdown(Duration::from_secs(30)).await;
/// # Ok(())
/// # }
/// ```
pub struct Indexer {
    config: IndexerConfig,
    store: Arc<Store>,
    registry: Arc<MatcherRegistry>,
    pools: Arc<PoolSet>,
    queue: TaskQueue,
    shutdown: ShutdownHandle,
    signal: ShutdownSignal,
    workers: Vec<JoinHandle<()>>,
}

impl Indexer {
    /// Build an indexer: open the store, load matchers, create pools, and
    /// start the workers.
    pub async fn new(config: IndexerConfig) -> Result<Self> {
        let store = Store::open(&config.database)?;
        Self::with_store(config, store).await
    }

    /// Build an indexer on an existing store (tests, in-memory runs)
    pub async fn with_store(config: IndexerConfig, store: Store) -> Result<Self> {
        if config.servers.is_empty() {
            return Err(IndexError::Config("no servers configured".to_string()));
        }

        let registry = match &config.regexp_file {
            Some(path) => MatcherRegistry::load(path)?,
            None => MatcherRegistry::builtin(),
        };

        let store = Arc::new(store);
        let registry = Arc::new(registry);
        let pools = Arc::new(PoolSet::build(&config.servers).await?);
        let queue = TaskQueue::bounded(config.queue_capacity);
        let (shutdown, signal) = shutdown_channel();

        let workers = (0..config.worker_count.max(1))
            .map(|id| {
                let worker = Worker::new(
                    id,
                    queue.clone(),
                    pools.clone(),
                    store.clone(),
                    registry.clone(),
                    RetryConfig::default(),
                    signal.clone(),
                );
                tokio::spawn(worker.run())
            })
            .collect();

        let indexer = Self {
            config,
            store,
            registry,
            pools,
            queue,
            shutdown,
            signal,
            workers,
        };
        indexer.apply_initial_watches().await?;
        Ok(indexer)
    }

    /// Watch every group named in the configuration
    pub async fn apply_initial_watches(&self) -> Result<()> {
        let groups = self.config.groups.clone();
        self.store
            .run_blocking(move |store| {
                for group in &groups {
                    store.upsert_group(group)?;
                    store.set_watch(group, true)?;
                }
                Ok(())
            })
            .await
    }

    /// Enqueue a group-list refresh for every configured server
    pub async fn refresh_groups(&self) -> Result<()> {
        for server in &self.config.servers {
            self.queue
                .push(Task::ListGroups {
                    server: server.host.clone(),
                })
                .await?;
        }
        Ok(())
    }

    /// Plan and enqueue fetches for every watched group.
    ///
    /// With `count`, each group gets an initial sweep of that many articles;
    /// otherwise the sweep is incremental from the last indexed number.
    pub async fn refresh_watched(&self, count: Option<u64>) -> Result<()> {
        let watched = self.store.run_blocking(|store| store.watched()).await?;
        for group in watched {
            if self.signal.is_cancelled() {
                return Err(IndexError::Cancelled);
            }
            let chunks = self.plan_group(&group.name, count).await?;
            debug!(group = %group.name, chunks, "watched group planned");
        }
        Ok(())
    }

    /// Plan and enqueue an initial sweep of `count` articles for one group
    pub async fn top_up(&self, group: &str, count: u64) -> Result<()> {
        let chunks = self.plan_group(group, Some(count)).await?;
        info!(group, chunks, count, "top-up planned");
        Ok(())
    }

    /// Plan one group against the primary server and enqueue the chunks.
    ///
    /// Article numbering is per-server, and the index is server-agnostic by
    /// design, so planning always runs against the first configured server.
    /// Returns the number of chunks enqueued.
    async fn plan_group(&self, group: &str, initial: Option<u64>) -> Result<usize> {
        let server = &self.config.servers[0];
        let pool = self.pools.get(&server.host)?;

        let mut session = pool.get().await?;
        let info = match session.select_group(group).await {
            Ok(info) => info,
            Err(IndexError::NoSuchGroup(_)) => {
                warn!(group, "group not carried by server, unwatching");
                let group = group.to_string();
                self.store
                    .run_blocking(move |store| store.mark_missing(&group))
                    .await?;
                return Ok(0);
            }
            Err(e) => return Err(e),
        };
        drop(session); // capacity back before store reads and enqueueing

        if info.is_empty() {
            debug!(group, "server reports empty group");
            return Ok(0);
        }

        let group_name = group.to_string();
        let last_indexed = self
            .store
            .run_blocking(move |store| store.max_indexed(&group_name))
            .await?;
        // A group with nothing indexed is newly watched: bound its first
        // sweep by the configured backfill unless the caller sized it
        let backfill = match initial {
            Some(count) => Some(count),
            None if last_indexed == 0 => Some(self.config.backfill),
            None => None,
        };
        let start = planner::start_point(info.first, info.last, last_indexed, backfill);
        if info.last < start {
            return Ok(0);
        }

        let group_name = group.to_string();
        let indexed = self
            .store
            .run_blocking(move |store| store.indexed_numbers(&group_name, start, info.last))
            .await?;
        let chunks = planner::chunks(
            &planner::missing_intervals(start, info.last, &indexed),
            server.xover_span,
        );

        let count = chunks.len();
        for chunk in chunks {
            self.queue
                .push(Task::FetchRange {
                    server: server.host.clone(),
                    group: group.to_string(),
                    lo: chunk.lo,
                    hi: chunk.hi,
                })
                .await?;
        }
        Ok(count)
    }

    /// Watch a group; returns whether the group row already existed
    pub async fn watch(&self, group: &str) -> Result<bool> {
        let group = group.to_string();
        self.store
            .run_blocking(move |store| {
                let existed = store.set_watch(&group, true)?;
                if !existed {
                    store.upsert_group(&group)?;
                    store.set_watch(&group, true)?;
                }
                Ok(existed)
            })
            .await
    }

    /// Unwatch a group; returns whether the group row existed
    pub async fn unwatch(&self, group: &str) -> Result<bool> {
        let group = group.to_string();
        self.store
            .run_blocking(move |store| store.set_watch(&group, false))
            .await
    }

    /// Re-run the matcher registry over articles with no segment.
    ///
    /// Used after matcher updates; returns the number of segments written.
    /// The whole sweep runs on the blocking pool.
    pub async fn rematch(&self) -> Result<u64> {
        let registry = self.registry.clone();
        self.store
            .run_blocking(move |store| {
                let mut matched = 0;
                let mut after: Option<String> = None;

                loop {
                    let page = store.unmatched_articles(after.as_deref(), REMATCH_PAGE)?;
                    let Some(last) = page.last() else { break };
                    after = Some(last.message_id.clone());

                    for article in &page {
                        let fields = store
                            .groups_for_article(&article.message_id)?
                            .iter()
                            .find_map(|g| registry.match_subject(g, &article.subject));
                        if let Some(fields) = fields {
                            store.upsert_segment(&article.message_id, &fields)?;
                            matched += 1;
                        }
                    }
                }

                if matched > 0 {
                    info!(matched, "offline re-match wrote segments");
                }
                Ok(matched)
            })
            .await
    }

    /// Number of tasks waiting in the queue
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Row counts for the status surface
    pub fn stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }

    /// The underlying store, for the read paths of the outer shell
    pub fn store(&self) -> Arc<Store> {
        self.store.clone()
    }

    /// The loaded matcher registry
    pub fn registry(&self) -> Arc<MatcherRegistry> {
        self.registry.clone()
    }

    /// Stop accepting tasks, drain in-flight work up to `deadline`, and
    /// quit sessions. Unstarted tasks are discarded.
    pub async fn shutdown(mut self, deadline: Duration) {
        info!(queued = self.queue.len(), "shutting down");
        self.shutdown.shutdown();
        self.queue.close();

        let deadline_at = Instant::now() + deadline;
        for mut handle in std::mem::take(&mut self.workers) {
            let remaining = deadline_at.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining, &mut handle).await.is_err() {
                warn!("worker did not stop before deadline, aborting");
                handle.abort();
            }
        }

        self.pools.quit_idle_all().await;
        info!("shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    async fn test_indexer() -> Indexer {
        let config =
            IndexerConfig::single_server(ServerConfig::plain("news.example.invalid"));
        Indexer::with_store(config, Store::open_in_memory().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_watch_creates_missing_group() {
        let indexer = test_indexer().await;
        assert!(!indexer.watch("alt.binaries.tv").await.unwrap());
        let store = indexer.store();
        assert!(store.group("alt.binaries.tv").unwrap().unwrap().watch);

        // Watching again reports the existing row
        assert!(indexer.watch("alt.binaries.tv").await.unwrap());
        indexer.shutdown(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn test_unwatch_reports_missing_group() {
        let indexer = test_indexer().await;
        assert!(!indexer.unwatch("never.seen").await.unwrap());
        indexer.shutdown(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn test_initial_watches_applied() {
        let mut config =
            IndexerConfig::single_server(ServerConfig::plain("news.example.invalid"));
        config.groups = vec!["alt.binaries.tv".to_string(), "alt.binaries.hdtv".to_string()];
        let indexer = Indexer::with_store(config, Store::open_in_memory().unwrap())
            .await
            .unwrap();

        assert_eq!(indexer.store().watched().unwrap().len(), 2);
        indexer.shutdown(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn test_refresh_groups_enqueues_per_server() {
        let indexer = test_indexer().await;
        // Stop workers first so the queue depth is observable
        indexer.shutdown.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;

        indexer.refresh_groups().await.unwrap();
        assert_eq!(indexer.queue_depth(), 1);
    }

    #[tokio::test]
    async fn test_no_servers_is_a_config_error() {
        let config = IndexerConfig {
            servers: vec![],
            ..IndexerConfig::single_server(ServerConfig::plain("x"))
        };
        let result = Indexer::with_store(config, Store::open_in_memory().unwrap()).await;
        assert!(matches!(result, Err(IndexError::Config(_))));
    }

    #[tokio::test]
    async fn test_rematch_applies_new_matchers() {
        use crate::store::{Article, OverviewInsert};
        use chrono::{TimeZone, Utc};

        let indexer = test_indexer().await;
        let store = indexer.store();
        store
            .ingest_overview(
                "alt.binaries.tv",
                &[OverviewInsert {
                    number: 1,
                    article: Article {
                        message_id: "<m@x>".to_string(),
                        subject: r#"My.Release [01/10] - "file01.rar" yEnc (1/42)"#.to_string(),
                        poster: "p".to_string(),
                        posted: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                        size: 1,
                    },
                    // Ingested before the matcher existed
                    segment: None,
                }],
            )
            .unwrap();

        assert_eq!(indexer.rematch().await.unwrap(), 1);
        assert!(store.segment("<m@x>").unwrap().is_some());

        // A second pass finds nothing new
        assert_eq!(indexer.rematch().await.unwrap(), 0);
        indexer.shutdown(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn test_stats_and_queue_depth() {
        let indexer = test_indexer().await;
        let stats = indexer.stats().unwrap();
        assert_eq!(stats.articles, 0);
        assert_eq!(indexer.queue_depth(), 0);
        indexer.shutdown(Duration::from_millis(200)).await;
    }
}
