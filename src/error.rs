//! Relay-level error types shared across the transport, store, and refresh layers.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical relay error exposed by public APIs.
///
/// Transport and storage failures pass through unchanged so callers observe exactly what a
/// plain HTTP client would have produced; only the refresh protocol introduces the
/// [`AuthExpired`](Error::AuthExpired) condition.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS); never retried by the relay.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The session can no longer be recovered; the host must re-authenticate.
	#[error(transparent)]
	AuthExpired(#[from] AuthExpiredError),
}
impl Error {
	/// Returns `true` when the error signals an unrecoverable session.
	pub fn is_auth_expired(&self) -> bool {
		matches!(self, Self::AuthExpired(_))
	}
}

/// Configuration and validation failures raised by the relay.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Request body could not be serialized to JSON.
	#[error("Request body could not be serialized to JSON.")]
	BodySerialize {
		/// Underlying serialization failure.
		#[source]
		source: serde_json::Error,
	},
	/// Endpoint configuration produced an invalid URL.
	#[error("Endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Session credential builder validation failed.
	#[error("Unable to build session credential.")]
	CredentialBuild(#[from] crate::session::CredentialBuilderError),
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Reasons the refresh protocol declared the session unrecoverable.
///
/// Every variant maps to the same user-visible condition: stored credentials are cleared and
/// the host's expiry hook fires. The variants exist so logs can tell a rejected refresh token
/// apart from a transport drop or a malformed endpoint response.
#[derive(Debug, ThisError)]
pub enum AuthExpiredError {
	/// No refresh token is stored, so recovery was never attempted.
	#[error("No refresh token is available for the stored session.")]
	MissingRefreshToken,
	/// The refresh endpoint answered with a non-success status.
	#[error("Refresh endpoint rejected the refresh token (status {status}).")]
	RefreshRejected {
		/// HTTP status code returned by the refresh endpoint.
		status: u16,
	},
	/// The refresh endpoint answered 2xx but the body could not be parsed.
	#[error("Refresh endpoint returned a malformed body.")]
	RefreshResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code returned by the refresh endpoint.
		status: u16,
	},
	/// The refresh call failed before any response was received.
	#[error("Refresh call failed before a response was received.")]
	RefreshTransport {
		/// Underlying transport failure.
		#[source]
		source: BoxError,
	},
	/// A queued request saw the in-flight refresh fail.
	#[error("Session expired while this request was waiting for a refresh.")]
	Lapsed,
}
