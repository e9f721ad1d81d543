//! Parallel resource query engine
//!
//! Runs one task per entity under a cancellation scope derived from the
//! request. Within a task, resources are tried in index order; the first
//! success completes the entity's tag. The first task failure cancels the
//! scope and with it every in-flight fetch.

use crate::config::EsiConfig;
use crate::entity::{Entities, Entity, Resource, Tag};
use crate::error::{EsiError, Result};
use crate::fetch::{HttpFetcher, KvBackend, PageRequest};
use crate::metrics::EsiMetrics;
use crate::scanner;
use bytes::Bytes;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fetches all resources for one page's entities concurrently.
pub struct QueryEngine {
    http: HttpFetcher,
    kv: Option<Arc<dyn KvBackend>>,
    config: Arc<EsiConfig>,
    metrics: Arc<EsiMetrics>,
}

impl QueryEngine {
    pub fn new(config: Arc<EsiConfig>) -> Self {
        QueryEngine {
            http: HttpFetcher::new(),
            kv: None,
            config,
            metrics: Arc::new(EsiMetrics::new()),
        }
    }

    /// Attach the key-value backend driver used by non-URL resources.
    pub fn with_kv_backend(mut self, kv: Arc<dyn KvBackend>) -> Self {
        self.kv = Some(kv);
        self
    }

    pub fn metrics(&self) -> &EsiMetrics {
        &self.metrics
    }

    /// Parse one HTML response into entities, recording the page counters:
    /// one page per call, one tag per record found, one parse error per
    /// failed page. Same composition as [`crate::scanner::parse`].
    pub fn parse<R: Read>(&self, input: R) -> Result<Entities> {
        self.metrics.record_page_parsed();
        let result = self.parse_inner(input);
        if result.is_err() {
            self.metrics.record_parse_error();
        }
        result
    }

    fn parse_inner<R: Read>(&self, input: R) -> Result<Entities> {
        let raw_tags = scanner::scan(input, &self.config)?;
        self.metrics.record_tags_found(raw_tags.len());
        scanner::build_entities(raw_tags)
    }

    /// Query all resources for the given entities.
    ///
    /// Entities whose condition evaluates false for this request are
    /// omitted from the batch. The returned tags are in completion order,
    /// not stream order; callers that splice in order sort by `tag.start`.
    pub async fn query(&self, entities: Entities, req: &PageRequest) -> Result<Vec<Tag>> {
        let batch: Vec<Entity> = entities
            .0
            .into_iter()
            .filter(|e| {
                let included = e.condition.as_ref().map_or(true, |c| c.evaluate(req));
                if !included {
                    debug!(raw_tag = %e.raw_tag_text(), "condition false, include skipped");
                }
                included
            })
            .collect();

        if batch.is_empty() {
            return Ok(Vec::new());
        }
        self.metrics.record_query(batch.len());

        let cancel = req.cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_fetches));
        let (tx, mut rx) = mpsc::channel::<Tag>(batch.len());
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        for entity in batch {
            let worker = EntityWorker {
                http: self.http.clone(),
                kv: self.kv.clone(),
                metrics: self.metrics.clone(),
                req: req.clone(),
                cancel: cancel.clone(),
                default_timeout: self.config.default_timeout(),
                default_on_error: self.config.default_on_error.clone(),
            };
            let tx = tx.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = tokio::select! {
                    _ = worker.cancel.cancelled() => return Err(EsiError::Canceled),
                    permit = semaphore.acquire_owned() => {
                        permit.map_err(|_| EsiError::Internal("fetch semaphore closed".into()))?
                    }
                };
                let tag = worker.fetch_entity(entity).await?;
                tokio::select! {
                    _ = worker.cancel.cancelled() => Err(EsiError::Canceled),
                    sent = tx.send(tag) => {
                        sent.map_err(|_| EsiError::Canceled)
                    }
                }
            });
        }
        drop(tx);

        // the channel closes once every task has dropped its sender, so
        // the collector drains exactly the completed tags
        let collector = tokio::spawn(async move {
            let mut tags = Vec::new();
            while let Some(tag) = rx.recv().await {
                tags.push(tag);
            }
            tags
        });

        let mut first_err: Option<EsiError> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .unwrap_or_else(|e| Err(EsiError::Internal(format!("task join error: {}", e))));
            if let Err(err) = result {
                cancel.cancel();
                match &first_err {
                    None => first_err = Some(err),
                    // a real failure replaces a cancellation recorded first
                    Some(prev) if prev.is_canceled() && !err.is_canceled() => {
                        first_err = Some(err)
                    }
                    _ => {}
                }
            }
        }

        let tags = collector
            .await
            .map_err(|e| EsiError::Internal(format!("collector join error: {}", e)))?;

        if let Some(err) = first_err {
            if err.is_canceled() {
                self.metrics.record_canceled_query();
            }
            return Err(err);
        }
        Ok(tags)
    }
}

/// Everything one spawned entity task needs, cloned out of the engine.
struct EntityWorker {
    http: HttpFetcher,
    kv: Option<Arc<dyn KvBackend>>,
    metrics: Arc<EsiMetrics>,
    req: PageRequest,
    cancel: CancellationToken,
    default_timeout: Duration,
    default_on_error: Option<String>,
}

impl EntityWorker {
    /// Try the entity's resources in index order; first success completes
    /// the tag. When every resource fails the `onerror` text substitutes
    /// for the payload; without one, the first accumulated error is
    /// surfaced wrapped with the raw tag.
    async fn fetch_entity(&self, entity: Entity) -> Result<Tag> {
        let timeout = entity.timeout_or(self.default_timeout);
        let headers = entity.forwarded_headers(&self.req.headers);
        let mut first_err: Option<EsiError> = None;

        for resource in &entity.resources {
            match self
                .fetch_resource(resource, &entity, headers.clone(), timeout)
                .await
            {
                Ok(data) => {
                    self.metrics.record_fetch(data.len());
                    let mut tag = entity.tag.clone();
                    tag.data = data;
                    return Ok(tag);
                }
                Err(err) => {
                    let canceled = err.is_canceled();
                    if !canceled {
                        self.metrics.record_failed_fetch();
                        warn!(
                            resource = resource.index,
                            raw_tag = %entity.raw_tag_text(),
                            error = %err,
                            "resource fetch failed, trying next candidate"
                        );
                    }
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                    if canceled {
                        break;
                    }
                }
            }
        }

        let err = first_err.unwrap_or_else(|| EsiError::EmptySrc {
            raw_tag: entity.raw_tag_text(),
        });

        // cancellation is not an entity failure, so no fallback for it
        if !err.is_canceled() {
            if let Some(text) = entity
                .on_error
                .as_deref()
                .or(self.default_on_error.as_deref())
            {
                self.metrics.record_on_error_fallback();
                let mut tag = entity.tag.clone();
                tag.data = Bytes::copy_from_slice(text.as_bytes());
                return Ok(tag);
            }
        }

        Err(EsiError::EntityFailed {
            raw_tag: entity.raw_tag_text(),
            source: Box::new(err),
        })
    }

    async fn fetch_resource(
        &self,
        resource: &Resource,
        entity: &Entity,
        headers: http::HeaderMap,
        timeout: Duration,
    ) -> Result<Bytes> {
        if let Some(tpl) = &resource.url_template {
            let url = tpl.render(&self.req)?;
            return self.http.fetch(&url, headers, timeout, &self.cancel).await;
        }
        if resource.is_url {
            return self
                .http
                .fetch(&resource.url, headers, timeout, &self.cancel)
                .await;
        }

        // non-URL source: resolve through the key-value backend
        let Some(kv) = &self.kv else {
            return Err(EsiError::ResourceFetch {
                url: resource.url.clone(),
                reason: "no key-value backend configured".to_string(),
            });
        };
        let key = match (&entity.key_template, &entity.key) {
            (Some(tpl), _) => tpl.render(&self.req)?,
            (None, Some(key)) => key.clone(),
            (None, None) => resource.url.clone(),
        };
        tokio::select! {
            _ = self.cancel.cancelled() => Err(EsiError::Canceled),
            looked_up = tokio::time::timeout(timeout, kv.get(&key)) => match looked_up {
                Ok(result) => result,
                Err(_) => Err(EsiError::ResourceFetch {
                    url: key,
                    reason: "timed out".to_string(),
                }),
            },
        }
    }
}
