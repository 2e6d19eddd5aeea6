use std::time::Duration;

use crate::retry::RetryPolicy;

/// Transfer engine configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Timeout for a whole request, body included.
    pub request_timeout: Duration,
    /// Retry policy for manifests, keys and segments.
    pub retry: RetryPolicy,
    /// Maximum number of segments fetched at once within one transfer.
    pub segment_concurrency: usize,
    /// Run AES decryption on the blocking thread pool.
    pub offload_decryption: bool,
    /// Optional proxy for all transfers.
    pub proxy: Option<String>,
    pub user_agent: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            segment_concurrency: 4,
            offload_decryption: true,
            proxy: None,
            user_agent: concat!("beatportdl/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
