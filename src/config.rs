//! Engine configuration.
//!
//! Every field has a default so a config can be loaded from a partial JSON or
//! TOML document.
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Query engine configuration
///
/// # Example
///
/// ```rust
/// use framedex::EngineConfig;
///
/// let json = r#"{
///     "cache_capacity": 500,
///     "cache_ttl_seconds": 600,
///     "box_half_width": 0.02
/// }"#;
/// let config = EngineConfig::from_json(json).unwrap();
/// assert_eq!(config.cache_capacity, 500);
/// assert_eq!(config.spatial_max_objects, 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum number of cached query results
    #[serde(default = "EngineConfig::default_cache_capacity")]
    pub cache_capacity: usize,

    /// Lifetime of a cached result
    #[serde(default = "EngineConfig::default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    /// Boxes held by a quadtree node before it splits
    #[serde(default = "EngineConfig::default_spatial_max_objects")]
    pub spatial_max_objects: usize,

    /// Maximum quadtree depth
    #[serde(default = "EngineConfig::default_spatial_max_levels")]
    pub spatial_max_levels: usize,

    /// Half-width of the box built around each frame position
    #[serde(default = "EngineConfig::default_box_half_width")]
    pub box_half_width: f64,

    #[serde(default = "EngineConfig::default_page_limit")]
    pub default_page_limit: usize,

    /// Overlap worker threads
    #[serde(default = "EngineConfig::default_worker_threads")]
    pub worker_threads: usize,

    /// Pending overlap tasks accepted before submitters have to wait
    #[serde(default = "EngineConfig::default_queue_depth")]
    pub queue_depth: usize,

    #[serde(default = "EngineConfig::default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,

    #[serde(default = "EngineConfig::default_submit_retries")]
    pub submit_retries: u32,

    /// Retries for transient detection store failures
    #[serde(default = "EngineConfig::default_store_retries")]
    pub store_retries: u32,

    /// Streamed items written between flushes
    #[serde(default = "EngineConfig::default_stream_flush_every")]
    pub stream_flush_every: usize,
}

impl EngineConfig {
    const fn default_cache_capacity() -> usize {
        100
    }

    const fn default_cache_ttl_seconds() -> u64 {
        3600
    }

    const fn default_spatial_max_objects() -> usize {
        10
    }

    const fn default_spatial_max_levels() -> usize {
        4
    }

    const fn default_box_half_width() -> f64 {
        framedex_types::bbox::DEFAULT_HALF_WIDTH
    }

    const fn default_page_limit() -> usize {
        20
    }

    const fn default_worker_threads() -> usize {
        4
    }

    const fn default_queue_depth() -> usize {
        64
    }

    const fn default_submit_timeout_ms() -> u64 {
        500
    }

    const fn default_submit_retries() -> u32 {
        2
    }

    const fn default_store_retries() -> u32 {
        2
    }

    const fn default_stream_flush_every() -> usize {
        16
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "Cache capacity must be greater than zero");
        self.cache_capacity = capacity;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_seconds = ttl.as_secs();
        self
    }

    pub fn with_spatial_limits(mut self, max_objects: usize, max_levels: usize) -> Self {
        assert!(max_objects > 0, "Node capacity must be greater than zero");
        self.spatial_max_objects = max_objects;
        self.spatial_max_levels = max_levels;
        self
    }

    pub fn with_box_half_width(mut self, half_width: f64) -> Self {
        assert!(
            half_width > 0.0 && half_width <= 0.5,
            "Box half-width must be in (0, 0.5]"
        );
        self.box_half_width = half_width;
        self
    }

    pub fn with_workers(mut self, threads: usize, queue_depth: usize) -> Self {
        assert!(threads > 0, "Worker count must be greater than zero");
        assert!(queue_depth > 0, "Queue depth must be greater than zero");
        self.worker_threads = threads;
        self.queue_depth = queue_depth;
        self
    }

    pub fn with_store_retries(mut self, retries: u32) -> Self {
        self.store_retries = retries;
        self
    }

    pub fn with_stream_flush_every(mut self, items: usize) -> Self {
        assert!(items > 0, "Stream flush interval must be greater than zero");
        self.stream_flush_every = items;
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.cache_capacity == 0 {
            return Err("Cache capacity must be greater than zero".to_string());
        }

        if self.cache_ttl_seconds == 0 {
            return Err("Cache TTL must be positive".to_string());
        }

        if self.spatial_max_objects == 0 {
            return Err("Spatial node capacity must be greater than zero".to_string());
        }

        if !self.box_half_width.is_finite()
            || self.box_half_width <= 0.0
            || self.box_half_width > 0.5
        {
            return Err(format!(
                "Box half-width must be in (0, 0.5], got {}",
                self.box_half_width
            ));
        }

        if self.default_page_limit == 0 {
            return Err("Default page limit must be greater than zero".to_string());
        }

        if self.worker_threads == 0 {
            return Err("Worker thread count must be greater than zero".to_string());
        }

        if self.queue_depth == 0 {
            return Err("Queue depth must be greater than zero".to_string());
        }

        if self.stream_flush_every == 0 {
            return Err("Stream flush interval must be greater than zero".to_string());
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: EngineConfig = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: Self::default_cache_capacity(),
            cache_ttl_seconds: Self::default_cache_ttl_seconds(),
            spatial_max_objects: Self::default_spatial_max_objects(),
            spatial_max_levels: Self::default_spatial_max_levels(),
            box_half_width: Self::default_box_half_width(),
            default_page_limit: Self::default_page_limit(),
            worker_threads: Self::default_worker_threads(),
            queue_depth: Self::default_queue_depth(),
            submit_timeout_ms: Self::default_submit_timeout_ms(),
            submit_retries: Self::default_submit_retries(),
            store_retries: Self::default_store_retries(),
            stream_flush_every: Self::default_stream_flush_every(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_capacity, 100);
        assert_eq!(config.cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.spatial_max_objects, 10);
        assert_eq!(config.spatial_max_levels, 4);
        assert_eq!(config.box_half_width, 0.01);
        assert_eq!(config.default_page_limit, 20);
        assert_eq!(config.stream_flush_every, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = EngineConfig::default()
            .with_cache_capacity(10)
            .with_cache_ttl(Duration::from_secs(30))
            .with_box_half_width(0.05)
            .with_workers(2, 8);

        let json = config.to_json().unwrap();
        let deserialized = EngineConfig::from_json(&json).unwrap();

        assert_eq!(deserialized.cache_capacity, 10);
        assert_eq!(deserialized.cache_ttl_seconds, 30);
        assert_eq!(deserialized.box_half_width, 0.05);
        assert_eq!(deserialized.worker_threads, 2);
        assert_eq!(deserialized.queue_depth, 8);
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        assert!(EngineConfig::from_json(r#"{"cache_size": 5}"#).is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.box_half_width = 0.0;
        assert!(config.validate().is_err());

        config.box_half_width = f64::NAN;
        assert!(config.validate().is_err());

        config.box_half_width = 0.6;
        assert!(config.validate().is_err());

        config.box_half_width = 0.01;
        config.cache_capacity = 0;
        assert!(config.validate().is_err());

        config.cache_capacity = 1;
        config.queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[should_panic(expected = "Box half-width must be in (0, 0.5]")]
    fn test_invalid_half_width_panics() {
        EngineConfig::default().with_box_half_width(-1.0);
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_config_toml() {
        let config = EngineConfig::from_toml("cache_capacity = 7\nworker_threads = 3\n").unwrap();
        assert_eq!(config.cache_capacity, 7);
        assert_eq!(config.worker_threads, 3);
        assert!(config.to_toml().unwrap().contains("cache_capacity = 7"));
    }
}
