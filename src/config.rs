use std::time::Duration;

use crate::{
    common::{Id, MAX_BIT_LENGTH},
    Error, Result,
};

/// Default bucket capacity.
pub const DEFAULT_K: usize = 20;
/// Default number of parallel requests per lookup round.
pub const DEFAULT_ALPHA: usize = 3;
/// Default request timeout before abandoning an inflight request to a non-responding node.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2000); // 2 seconds
/// Default number of values kept by the [crate::server::DefaultServer].
pub const DEFAULT_MAX_VALUES: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
/// Dht Configurations.
///
/// Built once at startup and shared by every routing table and node that
/// uses it; `bit_length` in particular must never change under a live table.
pub struct Config {
    /// Width of the keyspace in bits, between 1 and [MAX_BIT_LENGTH].
    ///
    /// Defaults to [MAX_BIT_LENGTH]
    pub bit_length: usize,
    /// Bucket capacity, and the number of closest nodes a lookup converges on.
    ///
    /// Defaults to [DEFAULT_K]
    pub k: usize,
    /// Lookup concurrency.
    ///
    /// Defaults to [DEFAULT_ALPHA]
    pub alpha: usize,
    /// Request timeout duration.
    ///
    /// The longer this duration is, the longer lookups take until they are deemeed "done".
    /// The shorter this duration is, the more responses from busy nodes we miss out on.
    ///
    /// Defaults to [DEFAULT_REQUEST_TIMEOUT]
    pub request_timeout: Duration,
    /// Maximum number of values the default server stores.
    ///
    /// Defaults to [DEFAULT_MAX_VALUES]
    pub max_values: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bit_length: MAX_BIT_LENGTH,
            k: DEFAULT_K,
            alpha: DEFAULT_ALPHA,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_values: DEFAULT_MAX_VALUES,
        }
    }
}

impl Config {
    // === Options ===

    pub fn with_bit_length(mut self, bit_length: usize) -> Self {
        self.bit_length = bit_length;
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_alpha(mut self, alpha: usize) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_values(mut self, max_values: usize) -> Self {
        self.max_values = max_values;
        self
    }

    // === Public Methods ===

    pub fn validate(&self) -> Result<()> {
        if self.bit_length == 0 || self.bit_length > MAX_BIT_LENGTH {
            return Err(Error::InvalidConfig(format!(
                "bit_length must be between 1 and {MAX_BIT_LENGTH}, got {}",
                self.bit_length
            )));
        }
        if self.k == 0 {
            return Err(Error::InvalidConfig("k must be at least 1".into()));
        }
        if self.alpha == 0 {
            return Err(Error::InvalidConfig("alpha must be at least 1".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidConfig("request_timeout must not be zero".into()));
        }
        if self.max_values == 0 {
            return Err(Error::InvalidConfig("max_values must be at least 1".into()));
        }

        Ok(())
    }

    /// Key for `data` in this keyspace: its SHA-1 digest, truncated to `bit_length` bits.
    pub fn key_for<T: AsRef<[u8]>>(&self, data: T) -> Id {
        Id::hash(data).truncate(self.bit_length)
    }

    /// Random id in this keyspace.
    pub fn random_id(&self) -> Id {
        Id::random(self.bit_length)
    }
}
