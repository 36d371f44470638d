//! Query engine: request in, ordered results out.
//!
//! A request is canonicalized into a cache key. On a miss the interval and
//! spatial indices narrow the candidate detections, overlap queries fan out
//! over the worker pool, and the ordered result is cached before it is paged,
//! cursored or streamed back to the caller.
//!
//! Index builds run outside the lock and are swapped in under the write lock,
//! so queries never see a half-built index. Single inserts take the write
//! lock directly. Every swap or insert bumps the index generation, which is
//! part of each cache key, so a result computed against an older generation
//! is never served once the indices have changed.

pub mod index_set;
pub mod pool;
pub mod request;

pub use index_set::IndexSet;
pub use pool::{OverlapJob, OverlapPool, Windows};
pub use request::{QueryKind, QueryRequest};

use crate::cache::{CacheStats, QueryCache};
use crate::compute::temporal::{Interval, find_sequences};
use crate::config::EngineConfig;
use crate::error::{FramedexError, Result};
use crate::pagination::{CursorPage, JsonArrayStream, Page, SliceSource, paginate, paginate_cursor};
use crate::storage::{DetectionFilter, DetectionStore};
use framedex_types::detection::{Detection, DetectionMatch};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tokio_util::sync::CancellationToken;

/// A window with at least `count` simultaneous instances of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapMatch {
    pub video_id: String,
    pub object_name: String,
    pub start_time: f64,
    pub end_time: f64,
    /// Instances active when the window opened.
    pub instances: Vec<DetectionMatch>,
}

/// Detections of the requested objects, in request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceMatch {
    pub video_id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub steps: Vec<DetectionMatch>,
}

/// One entry of a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultItem {
    Detection(DetectionMatch),
    Overlap(OverlapMatch),
    Sequence(SequenceMatch),
}

impl ResultItem {
    /// Stable id used for cursor pagination.
    pub fn cursor_id(&self) -> String {
        match self {
            ResultItem::Detection(d) => d.id.clone(),
            ResultItem::Overlap(o) => format!(
                "{}/{}/{:016x}/{}",
                o.video_id,
                o.object_name,
                sortable_bits(o.start_time),
                o.instances.first().map_or("", |d| d.id.as_str())
            ),
            ResultItem::Sequence(s) => {
                let ids: Vec<&str> = s.steps.iter().map(|d| d.id.as_str()).collect();
                format!("{}/{}", s.video_id, ids.join(">"))
            }
        }
    }
}

/// Ordered results of one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub kind: QueryKind,
    pub items: Vec<ResultItem>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Engine counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub detections: usize,
    pub videos: usize,
    pub spatial_boxes: usize,
    pub interval_depth: usize,
    pub rebuilds: u64,
    pub generation: u64,
    pub cache: CacheStats,
}

/// Spatiotemporal query engine over video detections.
///
/// # Examples
///
/// ```
/// use framedex::prelude::*;
/// use serde_json::json;
///
/// let engine = QueryEngine::new(EngineConfig::default())?;
/// engine.load(vec![
///     Detection::new("p1", "lobby", "person", 0.0, 10.0),
///     Detection::new("p2", "lobby", "person", 2.0, 12.0),
/// ])?;
///
/// let result = engine.execute_json(&json!({"objects": "person", "count": 2}))?;
/// assert_eq!(result.len(), 1);
/// # Ok::<(), framedex::FramedexError>(())
/// ```
pub struct QueryEngine {
    config: EngineConfig,
    store: Option<Arc<dyn DetectionStore>>,
    indices: RwLock<IndexSet>,
    cache: QueryCache<Arc<QueryResult>>,
    pool: OverlapPool,
    rebuilds: AtomicU64,
    /// Bumped under the index write lock on every swap or insert.
    generation: AtomicU64,
}

impl QueryEngine {
    /// Create an empty engine with no backing store.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::create(config, None)
    }

    /// Create an engine that rebuilds its indices from `store`.
    pub fn with_store(config: EngineConfig, store: Arc<dyn DetectionStore>) -> Result<Self> {
        Self::create(config, Some(store))
    }

    pub(crate) fn create(
        config: EngineConfig,
        store: Option<Arc<dyn DetectionStore>>,
    ) -> Result<Self> {
        config.validate().map_err(FramedexError::InvalidInput)?;

        let pool = OverlapPool::new(
            config.worker_threads,
            config.queue_depth,
            config.submit_timeout(),
            config.submit_retries,
        )?;

        Ok(Self {
            indices: RwLock::new(IndexSet::empty(&config)),
            cache: QueryCache::new(config.cache_capacity, config.cache_ttl()),
            pool,
            store,
            config,
            rebuilds: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &QueryCache<Arc<QueryResult>> {
        &self.cache
    }

    /// Replace the indices with `detections`.
    pub fn load(&self, detections: Vec<Detection>) -> Result<usize> {
        let fresh = IndexSet::build(detections, &self.config)?;
        let count = fresh.len();
        self.swap(fresh);
        Ok(count)
    }

    /// Rebuild the indices from the detection store.
    pub fn rebuild(&self) -> Result<usize> {
        let detections = self.call_store(|store| store.list_detections(&[], None))?;
        let count = self.load(detections)?;
        log::info!("Rebuilt indices from store: {} detections", count);
        Ok(count)
    }

    fn swap(&self, fresh: IndexSet) {
        {
            let mut indices = self.indices.write();
            *indices = fresh;
            self.generation.fetch_add(1, AtomicOrdering::AcqRel);
        }
        self.rebuilds.fetch_add(1, AtomicOrdering::Relaxed);
        // Old-generation keys can no longer be hit; drop them eagerly.
        self.cache.clear();
    }

    /// Add one detection to the live indices.
    pub fn ingest(&self, detection: Detection) -> Result<()> {
        {
            let mut indices = self.indices.write();
            indices.insert(detection)?;
            self.generation.fetch_add(1, AtomicOrdering::AcqRel);
        }
        self.cache.clear();
        Ok(())
    }

    /// Cache parameters of `request` under the current index generation.
    ///
    /// The generation is read before the lookup. A result computed while a
    /// swap lands is stored under the old generation and never served again.
    fn cache_params(&self, request: &QueryRequest) -> serde_json::Value {
        let mut params = request.cache_params();
        if let Some(fields) = params.as_object_mut() {
            fields.insert(
                "generation".into(),
                self.generation.load(AtomicOrdering::Acquire).into(),
            );
        }
        params
    }

    /// Count detections in the backing store.
    pub fn count(&self, filter: &DetectionFilter) -> Result<usize> {
        self.call_store(|store| store.count_detections(filter))
    }

    /// Call the store, retrying transient failures.
    fn call_store<T>(&self, call: impl Fn(&dyn DetectionStore) -> Result<T>) -> Result<T> {
        let store = self.store.as_deref().ok_or_else(|| {
            FramedexError::InvalidInput("Engine has no detection store configured".into())
        })?;

        let attempts = self.config.store_retries + 1;
        let mut attempt = 1;
        loop {
            match call(store) {
                Err(e) if e.is_transient() && attempt < attempts => {
                    log::warn!(
                        "Detection store call failed (attempt {} of {}): {}",
                        attempt,
                        attempts,
                        e
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Parse `params` and run the query.
    pub fn execute_json(&self, params: &serde_json::Value) -> Result<Arc<QueryResult>> {
        self.execute(&QueryRequest::from_json(params)?)
    }

    /// Run a query through the cache.
    pub fn execute(&self, request: &QueryRequest) -> Result<Arc<QueryResult>> {
        self.execute_cancellable(request, &CancellationToken::new())
    }

    /// Like [`execute`](Self::execute), stopping with
    /// `FramedexError::Cancelled` once `cancel` fires. Cancelled runs are not
    /// cached.
    pub fn execute_cancellable(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<Arc<QueryResult>> {
        request.validate()?;
        let kind = request.kind();
        let params = self.cache_params(request);

        self.cache.try_query(kind.as_str(), &params, || {
            log::debug!("Cache miss for {} query: {}", kind.as_str(), params);
            let items = self.compute(request, cancel)?;
            Ok(Arc::new(QueryResult { kind, items }))
        })
    }

    /// Async form of [`execute_cancellable`](Self::execute_cancellable).
    ///
    /// Overlap jobs are queued with [`OverlapPool::submit`] and awaited, so
    /// the calling runtime thread is never blocked on the workers.
    pub async fn execute_async(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<Arc<QueryResult>> {
        request.validate()?;
        let kind = request.kind();
        let params = self.cache_params(request);

        if let Some(hit) = self.cache.get(kind.as_str(), &params) {
            return Ok(hit);
        }
        log::debug!("Cache miss for {} query: {}", kind.as_str(), params);

        let candidates = self.indices.read().candidates(request, cancel)?;
        let items = match kind {
            QueryKind::Detections => detection_items(&candidates),
            QueryKind::Sequences => {
                sequences(&request.objects, candidates, request.max_gap, cancel)?
            }
            QueryKind::Overlaps => {
                let jobs = overlap_jobs(candidates, request.count.unwrap_or(2))?;
                if cancel.is_cancelled() {
                    return Err(FramedexError::Cancelled);
                }
                let labels = job_labels(&jobs);

                let mut handles = Vec::with_capacity(jobs.len());
                for job in jobs {
                    handles.push(self.pool.submit(job).await?);
                }
                let mut results = Vec::with_capacity(handles.len());
                for handle in handles {
                    let windows = handle.await.map_err(|_| {
                        FramedexError::Internal("overlap worker dropped a task".into())
                    })??;
                    results.push(windows);
                }
                overlap_items(labels, results)
            }
        };

        let result = Arc::new(QueryResult { kind, items });
        self.cache.set(kind.as_str(), &params, result.clone());
        Ok(result)
    }

    fn compute(&self, request: &QueryRequest, cancel: &CancellationToken) -> Result<Vec<ResultItem>> {
        let candidates = self.indices.read().candidates(request, cancel)?;

        match request.kind() {
            QueryKind::Detections => Ok(detection_items(&candidates)),
            QueryKind::Sequences => sequences(&request.objects, candidates, request.max_gap, cancel),
            QueryKind::Overlaps => {
                let jobs = overlap_jobs(candidates, request.count.unwrap_or(2))?;
                if cancel.is_cancelled() {
                    return Err(FramedexError::Cancelled);
                }
                let labels = job_labels(&jobs);
                let results = self.pool.run_all(jobs)?;
                Ok(overlap_items(labels, results))
            }
        }
    }

    /// Page `page` of the results, `limit` defaulting to the configured size.
    pub fn execute_page(
        &self,
        request: &QueryRequest,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Page<ResultItem>> {
        let result = self.execute(request)?;
        let limit = limit.or(Some(self.config.default_page_limit));
        Ok(paginate(&result.items, page, limit))
    }

    /// Results after `token`, ordered by [`ResultItem::cursor_id`].
    pub fn execute_cursor(
        &self,
        request: &QueryRequest,
        token: Option<&str>,
        limit: Option<usize>,
    ) -> Result<CursorPage<ResultItem>> {
        let result = self.execute(request)?;
        let keyed: Vec<(String, ResultItem)> = result
            .items
            .iter()
            .map(|item| (item.cursor_id(), item.clone()))
            .collect();
        let source = SliceSource::new(keyed, keyed_id);
        let page = paginate_cursor(
            &source,
            token,
            limit.unwrap_or(self.config.default_page_limit),
        )?;
        Ok(CursorPage {
            results: page.results.into_iter().map(|(_, item)| item).collect(),
            next_cursor: page.next_cursor,
            has_more: page.has_more,
        })
    }

    /// Write the results to `writer` as `{"results":[...],"count":N}`,
    /// flushing every `stream_flush_every` items.
    ///
    /// The frame is opened once the request validates. If the query fails or
    /// `cancel` fires, the frame is left open and the error is returned.
    pub fn stream<W: Write>(
        &self,
        request: &QueryRequest,
        writer: W,
        cancel: &CancellationToken,
    ) -> Result<W> {
        request.validate()?;
        let mut stream =
            JsonArrayStream::new(writer)?.with_flush_every(self.config.stream_flush_every);
        stream.flush()?;

        match self.execute_cancellable(request, cancel) {
            Ok(result) => stream.finish_with(result.items.iter(), cancel),
            Err(e) => {
                log::warn!("Query failed after the stream was opened: {}", e);
                stream.abort();
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> EngineStats {
        let indices = self.indices.read();
        EngineStats {
            detections: indices.len(),
            videos: indices.video_count(),
            spatial_boxes: indices.box_count(),
            interval_depth: indices.interval_depth(),
            rebuilds: self.rebuilds.load(AtomicOrdering::Relaxed),
            generation: self.generation.load(AtomicOrdering::Acquire),
            cache: self.cache.stats(),
        }
    }
}

fn keyed_id(entry: &(String, ResultItem)) -> &str {
    &entry.0
}

/// Maps `t` to bits whose unsigned order matches the numeric order of `t`.
fn sortable_bits(t: f64) -> u64 {
    let bits = t.to_bits();
    if bits >> 63 == 1 { !bits } else { bits | (1 << 63) }
}

fn detection_items(candidates: &[Arc<Detection>]) -> Vec<ResultItem> {
    candidates
        .iter()
        .map(|d| ResultItem::Detection(DetectionMatch::from(d.as_ref())))
        .collect()
}

/// One job per `(video_id, object_name)` group large enough to reach `count`.
fn overlap_jobs(candidates: Vec<Arc<Detection>>, count: usize) -> Result<Vec<OverlapJob>> {
    let mut groups: BTreeMap<(String, String), Vec<Interval<Arc<Detection>>>> = BTreeMap::new();
    for detection in candidates {
        let key = (detection.video_id.clone(), detection.object_name.clone());
        let interval = Interval::new(detection.start_time, detection.end_time, detection)?;
        groups.entry(key).or_default().push(interval);
    }

    Ok(groups
        .into_iter()
        .filter(|(_, instances)| instances.len() >= count)
        .map(|((video_id, object_name), instances)| OverlapJob {
            video_id,
            object_name,
            instances,
            count,
        })
        .collect())
}

fn job_labels(jobs: &[OverlapJob]) -> Vec<(String, String)> {
    jobs.iter()
        .map(|job| (job.video_id.clone(), job.object_name.clone()))
        .collect()
}

fn overlap_items(labels: Vec<(String, String)>, results: Vec<Windows>) -> Vec<ResultItem> {
    let mut items = Vec::new();
    for ((video_id, object_name), windows) in labels.into_iter().zip(results) {
        for window in windows {
            items.push(ResultItem::Overlap(OverlapMatch {
                video_id: video_id.clone(),
                object_name: object_name.clone(),
                start_time: window.start_time,
                end_time: window.end_time,
                instances: window
                    .instances
                    .iter()
                    .map(|d| DetectionMatch::from(d.as_ref()))
                    .collect(),
            }));
        }
    }
    items
}

/// Per video, chains of detections following `objects` in order.
fn sequences(
    objects: &[String],
    candidates: Vec<Arc<Detection>>,
    max_gap: Option<f64>,
    cancel: &CancellationToken,
) -> Result<Vec<ResultItem>> {
    let mut by_video: BTreeMap<String, Vec<Arc<Detection>>> = BTreeMap::new();
    for detection in candidates {
        by_video
            .entry(detection.video_id.clone())
            .or_default()
            .push(detection);
    }

    let mut items = Vec::new();
    for (video_id, detections) in by_video {
        if cancel.is_cancelled() {
            return Err(FramedexError::Cancelled);
        }

        let steps = objects
            .iter()
            .map(|name| {
                detections
                    .iter()
                    .filter(|d| d.object_name == *name)
                    .map(|d| Interval::new(d.start_time, d.end_time, d.clone()))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        for chain in find_sequences(&steps, max_gap) {
            items.push(ResultItem::Sequence(SequenceMatch {
                video_id: video_id.clone(),
                start_time: chain.start_time,
                end_time: chain.end_time,
                steps: chain
                    .steps
                    .iter()
                    .map(|d| DetectionMatch::from(d.as_ref()))
                    .collect(),
            }));
        }
    }
    Ok(items)
}
