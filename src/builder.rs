//! Builder for query engines.
//!
//! Gathers configuration, an optional detection store and optional
//! preloaded detections, then produces a ready `QueryEngine`.

use crate::config::EngineConfig;
use crate::engine::QueryEngine;
use crate::error::{FramedexError, Result};
use crate::storage::DetectionStore;
use framedex_types::detection::Detection;
use std::path::Path;
use std::sync::Arc;

/// Builder for [`QueryEngine`].
///
/// ```
/// use framedex::prelude::*;
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryStore::from_detections(vec![
///     Detection::new("d1", "v1", "car", 0.0, 4.0),
/// ]));
/// let engine = EngineBuilder::new().store(store).build()?;
/// assert_eq!(engine.stats().detections, 1);
/// # Ok::<(), framedex::FramedexError>(())
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn DetectionStore>>,
    detections: Vec<Detection>,
    rebuild_on_start: bool,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            store: None,
            detections: Vec::new(),
            rebuild_on_start: true,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Load configuration from a file. `.toml` files need the `toml`
    /// feature; anything else is read as JSON.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;

        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        self.config = if is_toml {
            Self::parse_toml(&text)?
        } else {
            EngineConfig::from_json(&text)?
        };
        Ok(self)
    }

    #[cfg(feature = "toml")]
    fn parse_toml(text: &str) -> Result<EngineConfig> {
        EngineConfig::from_toml(text).map_err(|e| FramedexError::Serialization(e.to_string()))
    }

    #[cfg(not(feature = "toml"))]
    fn parse_toml(_text: &str) -> Result<EngineConfig> {
        Err(FramedexError::InvalidInput(
            "TOML configuration requires the 'toml' feature".into(),
        ))
    }

    /// Back the engine with `store`. Indices are built from it on
    /// [`build`](Self::build) unless [`lazy`](Self::lazy) is set.
    pub fn store(mut self, store: Arc<dyn DetectionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Index these detections instead of reading a store.
    pub fn detections(mut self, detections: Vec<Detection>) -> Self {
        self.detections = detections;
        self
    }

    /// Skip the initial rebuild from the store.
    pub fn lazy(mut self) -> Self {
        self.rebuild_on_start = false;
        self
    }

    pub fn build(self) -> Result<QueryEngine> {
        if self.store.is_some() && !self.detections.is_empty() {
            return Err(FramedexError::InvalidInput(
                "Use either a detection store or preloaded detections, not both".into(),
            ));
        }

        let has_store = self.store.is_some();
        let engine = QueryEngine::create(self.config, self.store)?;

        if has_store && self.rebuild_on_start {
            engine.rebuild()?;
        } else if !self.detections.is_empty() {
            engine.load(self.detections)?;
        }
        Ok(engine)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
