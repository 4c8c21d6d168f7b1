//! Configuration limits and timeouts, one `*Limits` struct per component.
//!
//! Follows the same convention the teacher crate uses for its own
//! `ServerLimits`/`ReqLimits`/`RespLimits`: a plain struct with a `Default`
//! impl carrying the numeric defaults called out in the spec, so callers can
//! override individual fields with struct-update syntax.
//!
//! ```
//! use meshrelay::limits::ReqLimits;
//!
//! let limits = ReqLimits {
//!     max_request_size: 64 * 1024,
//!     ..ReqLimits::default()
//! };
//! # let _ = limits;
//! ```

use std::time::Duration;

/// Limits enforced by the HTTP streaming parser (§4.2).
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Cumulative bytes (consumed + buffered + pending body) before a `413`.
    pub max_request_size: usize,
    /// Longest the `METHOD` token may grow before a space is required.
    pub max_method_len: usize,
    /// Longest the `VERSION` line may grow before a `\n` is required.
    pub max_version_len: usize,
    /// Maximum number of headers accepted per request.
    pub max_header_count: usize,
    /// Longest a single header line may be.
    pub max_header_line_len: usize,
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            max_request_size: 1024 * 1024,
            max_method_len: 8,
            max_version_len: 16,
            max_header_count: 64,
            max_header_line_len: 8 * 1024,
        }
    }
}

/// Limits enforced by the netstring parser (§4.2).
#[derive(Debug, Clone)]
pub struct NetstringLimits {
    /// Largest payload a single netstring frame may carry.
    pub max_body_size: usize,
}

impl Default for NetstringLimits {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024,
        }
    }
}

/// Limits and timeouts for the frontend server (§4.3).
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Capacity of the `request_history` ring buffer used for timeouts.
    /// `0` disables the timeout mechanism entirely.
    pub request_history_capacity: usize,
    /// How long a request may sit in flight before the server synthesizes
    /// a `504` and publishes an interrupt for it.
    pub request_timeout: Duration,
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            request_history_capacity: 0,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Limits for the load-balancing proxy (§4.4, §9b).
#[derive(Debug, Clone)]
pub struct ProxyLimits {
    /// Heartbeats older than this are culled from the FIFO; resolves the
    /// "expiration of idle workers" open question (§9b).
    pub worker_expiry: Duration,
}

impl Default for ProxyLimits {
    fn default() -> Self {
        Self {
            worker_expiry: Duration::from_secs(30),
        }
    }
}

/// Limits for the worker loop (§4.5).
#[derive(Debug, Clone)]
pub struct WorkerLimits {
    /// Poll timeout between `advertise()` calls; also the staleness bound
    /// the proxy uses when it considers culling an idle worker.
    pub heartbeat_interval: Duration,
}

impl Default for WorkerLimits {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
        }
    }
}

/// Limits for the batching client (§4.6).
#[derive(Debug, Clone)]
pub struct ClientLimits {
    /// Maximum requests submitted per request-phase before switching to
    /// the collect phase.
    pub batch_size: usize,
    /// Size of the transport's internal batch, used only so the S6
    /// overflow test can pick a request size guaranteed to cross it.
    pub transport_batch_size: usize,
}

impl Default for ClientLimits {
    fn default() -> Self {
        Self {
            batch_size: 10,
            transport_batch_size: 8192,
        }
    }
}
