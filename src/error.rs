/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Invalid method, URI or header supplied while building a request.
    #[error("invalid request configuration: {reason}")]
    Configuration { reason: String },
    /// Execution was attempted without a target URI.
    #[error("request URI must be specified")]
    MissingUri,
    /// The streamed request body could not be read into memory.
    #[error("failed to read request body: {0}")]
    ReadBody(#[source] std::io::Error),
    /// A single attempt exceeded its timeout.
    #[error("attempt {attempt} timed out")]
    NetworkTimeout { attempt: u32 },
    /// A single attempt failed at the transport layer.
    #[error("attempt {attempt} failed: {source}")]
    Network {
        /// Zero-based index of the failing attempt.
        attempt: u32,
        #[source]
        source: reqwest::Error,
    },
    /// A response arrived but its body could not be read; never retried.
    #[error("failed to read response body at attempt {attempt}: {source}")]
    ResponseBody {
        attempt: u32,
        #[source]
        source: reqwest::Error,
    },
    /// The cancellation token fired before or during an attempt.
    #[error("request cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
    /// Every attempt in the budget failed.
    #[error("request failed after {attempts} attempt(s)")]
    RetriesExhausted {
        attempts: u32,
        /// Failure of the final attempt.
        #[source]
        last: Box<RequestError>,
    },
}

impl RequestError {
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Returns `true` for a per-attempt timeout, or exhaustion caused by one.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::NetworkTimeout { .. } => true,
            Self::RetriesExhausted { last, .. } => last.is_timeout(),
            _ => false,
        }
    }

    /// Returns `true` for failures the executor retries within its budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkTimeout { .. } | Self::Network { .. })
    }

    /// Number of attempts made before this error was produced, when known.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Cancelled { attempts } | Self::RetriesExhausted { attempts, .. } => {
                Some(*attempts)
            }
            Self::ResponseBody { attempt, .. } => Some(attempt + 1),
            Self::Configuration { .. } | Self::MissingUri | Self::ReadBody(_) => Some(0),
            Self::NetworkTimeout { .. } | Self::Network { .. } => None,
        }
    }
}
