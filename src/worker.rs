//! Worker loop
//!
//! Each worker pulls tasks from the shared queue, borrows a session from
//! the right server pool for the duration of one task, and writes results
//! through the store. Transient failures re-enqueue the task with jittered
//! exponential backoff; a failed article drops only that article.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::client::NntpClient;
use crate::commands::OverviewRecord;
use crate::decode::{decode_header, parse_article_date};
use crate::error::{IndexError, Result};
use crate::matcher::MatcherRegistry;
use crate::pool::{PoolSet, RetryConfig};
use crate::store::{Article, OverviewInsert, Store};
use crate::tasks::{QueuedTask, ShutdownSignal, Task, TaskQueue};

/// One queue consumer
pub struct Worker {
    id: usize,
    queue: TaskQueue,
    pools: Arc<PoolSet>,
    store: Arc<Store>,
    registry: Arc<MatcherRegistry>,
    retry: RetryConfig,
    shutdown: ShutdownSignal,
}

impl Worker {
    /// Create a worker over the shared queue, pools, store, and registry
    pub fn new(
        id: usize,
        queue: TaskQueue,
        pools: Arc<PoolSet>,
        store: Arc<Store>,
        registry: Arc<MatcherRegistry>,
        retry: RetryConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            id,
            queue,
            pools,
            store,
            registry,
            retry,
            shutdown,
        }
    }

    /// Consume tasks until the queue closes or shutdown is observed
    pub async fn run(mut self) {
        info!(worker = self.id, "worker starting");
        let mut shutdown = self.shutdown.clone();

        loop {
            let queued = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                queued = self.queue.pop() => match queued {
                    Some(q) => q,
                    None => break,
                },
            };
            self.handle(queued).await;
        }

        info!(worker = self.id, "worker stopped");
    }

    async fn handle(&mut self, queued: QueuedTask) {
        let label = queued.task.describe();
        debug!(worker = self.id, task = %label, "executing task");

        match self.execute(&queued.task).await {
            Ok(()) => {}
            Err(IndexError::Cancelled) => {
                debug!(worker = self.id, task = %label, "task cancelled by shutdown");
            }
            Err(e) if e.is_transient() => self.requeue(queued, e).await,
            Err(e) => {
                error!(worker = self.id, task = %label, error = %e, "task failed permanently");
            }
        }
    }

    /// Re-enqueue a transiently failed task, up to the retry cap.
    async fn requeue(&mut self, mut queued: QueuedTask, cause: IndexError) {
        let label = queued.task.describe();
        if queued.attempt >= self.retry.max_retries {
            error!(
                worker = self.id,
                task = %label,
                error = %cause,
                "task failed after {} attempts, dropping",
                queued.attempt + 1
            );
            return;
        }

        let delay = self.retry.backoff_for(queued.attempt);
        warn!(
            worker = self.id,
            task = %label,
            error = %cause,
            "task failed, retrying in {:?}",
            delay
        );

        if self.shutdown.sleep(delay).await.is_err() {
            debug!(worker = self.id, task = %label, "retry abandoned by shutdown");
            return;
        }

        queued.attempt += 1;
        if self.queue.push_queued(queued).await.is_err() {
            debug!(worker = self.id, task = %label, "queue closed, dropping retry");
        }
    }

    async fn execute(&self, task: &Task) -> Result<()> {
        match task {
            Task::ListGroups { server } => self.list_groups(server).await,
            Task::FetchRange {
                server,
                group,
                lo,
                hi,
            } => self.fetch_range(server, group, *lo, *hi).await,
        }
    }

    async fn list_groups(&self, server: &str) -> Result<()> {
        let pool = self.pools.get(server)?;
        let mut session = pool.get().await?;

        let result = session.list_active("*").await;
        poison_on_server_error(&mut session, &result);
        let groups = result?;
        drop(session);

        let names: Vec<String> = groups.into_iter().map(|g| g.name).collect();
        let total = names.len();
        let created = self
            .store
            .run_blocking(move |store| store.upsert_groups(&names))
            .await?;
        info!(server, total, created, "group list refreshed");
        Ok(())
    }

    async fn fetch_range(&self, server: &str, group: &str, lo: u64, hi: u64) -> Result<()> {
        if lo > hi {
            return Ok(());
        }

        let pool = self.pools.get(server)?;
        let mut session = pool.get().await?;

        match session.select_group(group).await {
            Ok(_) => {}
            Err(IndexError::NoSuchGroup(_)) => {
                warn!(server, group, "group no longer exists, unwatching");
                let group = group.to_string();
                self.store
                    .run_blocking(move |store| store.mark_missing(&group))
                    .await?;
                return Ok(());
            }
            Err(e) => {
                if let IndexError::Protocol { code, .. } = &e {
                    if *code >= 500 {
                        session.poison();
                    }
                }
                return Err(e);
            }
        }

        let result = session.fetch_xover(lo, hi).await;
        poison_on_server_error(&mut session, &result);
        let records = result?;
        drop(session); // capacity back before the store transaction

        let rows = self.build_rows(group, records);
        let indexed = rows.len();
        let group_name = group.to_string();
        self.store
            .run_blocking(move |store| store.ingest_overview(&group_name, &rows))
            .await?;

        debug!(server, group, lo, hi, indexed, "range ingested");
        Ok(())
    }

    /// Decode, date-parse, and match one XOVER batch, in server order.
    ///
    /// Bad articles drop individually: a record without a message-id or
    /// article number, or with an unparseable date, loses only itself.
    fn build_rows(&self, group: &str, records: Vec<OverviewRecord>) -> Vec<OverviewInsert> {
        let mut rows = Vec::with_capacity(records.len());

        for record in records {
            let message_id = record.message_id.trim().to_string();
            if message_id.is_empty() || record.number == 0 {
                warn!(group, number = record.number, "overview record without identity, dropped");
                continue;
            }

            let subject = decode_header(&record.subject);
            if subject.lossy {
                warn!(group, message_id = %message_id, "subject not decodable, ingested lossily");
            }
            let poster = decode_header(&record.poster);
            if poster.lossy {
                warn!(group, message_id = %message_id, "poster not decodable, ingested lossily");
            }

            let posted = match parse_article_date(&record.date) {
                Ok(posted) => posted,
                Err(e) => {
                    warn!(group, message_id = %message_id, error = %e, "article dropped");
                    continue;
                }
            };

            let subject = subject.text.trim().to_string();
            let segment = self.registry.match_subject(group, &subject);

            rows.push(OverviewInsert {
                number: record.number,
                article: Article {
                    message_id,
                    subject,
                    poster: poster.text.trim().to_string(),
                    posted,
                    size: record.bytes,
                },
                segment,
            });
        }

        rows
    }
}

/// Poison a session on a 5xx so the pool discards it; socket-level errors
/// already poisoned it at the I/O layer.
fn poison_on_server_error<T>(session: &mut NntpClient, result: &Result<T>) {
    if let Err(IndexError::Protocol { code, .. }) = result {
        if *code >= 500 {
            session.poison();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::tasks::shutdown_channel;

    fn record(number: u64, message_id: &str, subject: &[u8], date: &str) -> OverviewRecord {
        OverviewRecord {
            number,
            subject: subject.to_vec(),
            poster: b"poster <poster@example.com>".to_vec(),
            date: date.to_string(),
            message_id: message_id.to_string(),
            references: String::new(),
            bytes: 2048,
            lines: 16,
        }
    }

    async fn test_worker() -> Worker {
        // Pools are lazy: no connection is dialed until a task runs
        let pools = Arc::new(
            PoolSet::build(&[ServerConfig::plain("news.example.com")])
                .await
                .unwrap(),
        );
        let (_handle, signal) = shutdown_channel();
        Worker::new(
            0,
            TaskQueue::bounded(4),
            pools,
            Arc::new(Store::open_in_memory().unwrap()),
            Arc::new(MatcherRegistry::builtin()),
            RetryConfig::default(),
            signal,
        )
    }

    #[tokio::test]
    async fn test_build_rows_decodes_and_matches() {
        let worker = test_worker().await;
        let rows = worker.build_rows(
            "alt.binaries.tv",
            vec![record(
                10,
                " <m1@x> ",
                br#"My.Release.Name [01/10] - "file01.rar" yEnc (1/42)"#,
                "Mon, 01 Jan 2024 10:00:00 +0000",
            )],
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].number, 10);
        // Message-id is whitespace-trimmed at ingest
        assert_eq!(rows[0].article.message_id, "<m1@x>");
        let segment = rows[0].segment.as_ref().unwrap();
        assert_eq!(segment.release_name, "My.Release.Name");
        assert_eq!(segment.part_total, 42);
    }

    #[tokio::test]
    async fn test_build_rows_drops_bad_dates_only() {
        let worker = test_worker().await;
        let rows = worker.build_rows(
            "alt.binaries.tv",
            vec![
                record(1, "<ok@x>", b"fine", "Mon, 01 Jan 2024 10:00:00 +0000"),
                record(2, "<bad@x>", b"fine too", "not a date"),
                record(3, "<ok2@x>", b"also fine", "Tue, 02 Jan 2024 10:00:00 +0000"),
            ],
        );

        let ids: Vec<_> = rows.iter().map(|r| r.article.message_id.as_str()).collect();
        assert_eq!(ids, vec!["<ok@x>", "<ok2@x>"]);
    }

    #[tokio::test]
    async fn test_build_rows_drops_missing_identity() {
        let worker = test_worker().await;
        let rows = worker.build_rows(
            "alt.binaries.tv",
            vec![
                record(1, "   ", b"no id", "Mon, 01 Jan 2024 10:00:00 +0000"),
                record(0, "<zero@x>", b"number zero", "Mon, 01 Jan 2024 10:00:00 +0000"),
            ],
        );
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_build_rows_keeps_lossy_subject() {
        let worker = test_worker().await;
        // Bytes no chain member decodes cleanly: the article is still
        // ingested with a replacement-char subject
        let rows = worker.build_rows(
            "alt.binaries.tv",
            vec![record(
                4,
                "<lossy@x>",
                b"bad \x92 byte \x00",
                "Mon, 01 Jan 2024 10:00:00 +0000",
            )],
        );
        assert_eq!(rows.len(), 1);
        assert!(rows[0].article.subject.contains('\u{FFFD}'));
    }
}
