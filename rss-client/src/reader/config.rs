use std::time::Duration;

/// Tunables for [super::EpochReader]'s retry/failover behavior.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// How many times a single chunk is retried against the same piece
    /// before the reader fails over to the next one.
    pub chunk_fetch_failed_retry_max_times: u32,

    /// Fixed delay between chunk-fetch retries. Retries use a constant
    /// wait, not exponential backoff.
    pub chunk_fetch_retry_wait_time: Duration,

    /// Carried for forward compatibility with a local-disk fast path;
    /// `EpochReader` always fetches remotely regardless of this flag.
    pub local_chunk_fetch_enabled: bool,

    /// Upper bound the codec will trust a single block's original size
    /// to be, before allocating a buffer for it.
    pub max_original_block_length: u32,

    /// Upper bound the codec will trust a single block's compressed size
    /// to be.
    pub max_compressed_block_length: u32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            chunk_fetch_failed_retry_max_times: 3,
            chunk_fetch_retry_wait_time: Duration::from_millis(5),
            local_chunk_fetch_enabled: false,
            max_original_block_length: 64 * 1024 * 1024,
            max_compressed_block_length: 64 * 1024 * 1024,
        }
    }
}

/// Builder for [ReaderConfig], mirroring the defaults above field by
/// field so callers only need to override what they care about.
#[derive(Debug, Default)]
pub struct ReaderConfigBuilder {
    config: ReaderConfig,
}

impl ReaderConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ReaderConfig::default(),
        }
    }

    pub fn chunk_fetch_failed_retry_max_times(mut self, value: u32) -> Self {
        self.config.chunk_fetch_failed_retry_max_times = value;
        self
    }

    pub fn chunk_fetch_retry_wait_time(mut self, value: Duration) -> Self {
        self.config.chunk_fetch_retry_wait_time = value;
        self
    }

    pub fn local_chunk_fetch_enabled(mut self, value: bool) -> Self {
        self.config.local_chunk_fetch_enabled = value;
        self
    }

    pub fn build(self) -> ReaderConfig {
        self.config
    }
}
