//! Transport primitives for the relay.
//!
//! [`HttpTransport`] is the relay's only dependency on an HTTP stack: a minimal
//! `send(Request) -> Response` capability behind a boxed future, so the retry state machine
//! stays a plain unit-testable object. [`Request`] and [`Response`] are framework-neutral
//! value types; the default [`ReqwestTransport`] adapter lives behind the `reqwest` feature.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// self
use crate::{_prelude::*, error::ConfigError, error::TransportError, session::TokenSecret};

pub(crate) const AUTHORIZATION: &str = "authorization";
const CONTENT_TYPE: &str = "content-type";

/// HTTP methods issued through the relay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
	/// GET request.
	Get,
	/// POST request.
	Post,
	/// PUT request.
	Put,
	/// DELETE request.
	Delete,
	/// PATCH request.
	Patch,
}
impl Method {
	/// Returns the canonical uppercase method name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Delete => "DELETE",
			Method::Patch => "PATCH",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outbound request value consumed by [`HttpTransport::send`].
///
/// Header names are normalized to lowercase on insertion so bearer injection can overwrite a
/// stale `Authorization` value regardless of the caller's casing.
#[derive(Clone, Debug)]
pub struct Request {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL.
	pub url: Url,
	/// Header map keyed by lowercase header name.
	pub headers: BTreeMap<String, String>,
	/// Optional request body bytes.
	pub body: Option<Vec<u8>>,
}
impl Request {
	/// Creates a request with no headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: BTreeMap::new(), body: None }
	}

	/// Convenience constructor for GET requests.
	pub fn get(url: Url) -> Self {
		Self::new(Method::Get, url)
	}

	/// Convenience constructor for POST requests.
	pub fn post(url: Url) -> Self {
		Self::new(Method::Post, url)
	}

	/// Convenience constructor for PUT requests.
	pub fn put(url: Url) -> Self {
		Self::new(Method::Put, url)
	}

	/// Convenience constructor for DELETE requests.
	pub fn delete(url: Url) -> Self {
		Self::new(Method::Delete, url)
	}

	/// Inserts (or replaces) a header; the name is normalized to lowercase.
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Serializes `body` as the JSON payload and stamps the content type.
	pub fn with_json<T>(self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let bytes =
			serde_json::to_vec(body).map_err(|source| ConfigError::BodySerialize { source })?;
		let mut request = self.with_header(CONTENT_TYPE, "application/json");

		request.body = Some(bytes);

		Ok(request)
	}

	/// Attaches (or replaces) the `Authorization` header rendered from `token`.
	pub fn with_bearer(self, token: &TokenSecret) -> Self {
		self.with_header(AUTHORIZATION, token.bearer_header())
	}
}

/// Response value produced by [`HttpTransport::send`].
#[derive(Clone, Debug)]
pub struct Response {
	/// HTTP status code.
	pub status: u16,
	/// Header map keyed by lowercase header name.
	pub headers: BTreeMap<String, String>,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl Response {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns `true` when the response is the relay's sole recovery trigger (HTTP 401).
	pub fn is_unauthorized(&self) -> bool {
		self.status == 401
	}

	/// Returns a header value by case-insensitive name.
	pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
		self.headers.get(&name.as_ref().to_ascii_lowercase()).map(String::as_str)
	}

	/// Deserializes the body as JSON, reporting the failing path on malformed payloads.
	pub fn json<T>(&self) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
	where
		T: serde::de::DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
	}
}

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Response, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of executing relay requests.
///
/// Implementations must be `Send + Sync + 'static` so a single transport can sit behind
/// `Arc<dyn HttpTransport>` and serve interleaved requests for the lifetime of the relay.
/// The transport performs no retry or auth logic of its own; the relay owns both.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes one HTTP exchange, resolving non-2xx statuses as ordinary responses.
	///
	/// Only transport-level failures (DNS, TCP, TLS, IO) may surface as errors; status-level
	/// failures must come back as a [`Response`] so the relay can pass them through untouched.
	fn send(&self, request: Request) -> TransportFuture<'_>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: Request) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let method = match request.method {
				Method::Get => reqwest::Method::GET,
				Method::Post => reqwest::Method::POST,
				Method::Put => reqwest::Method::PUT,
				Method::Delete => reqwest::Method::DELETE,
				Method::Patch => reqwest::Method::PATCH,
			};
			let mut builder = client.request(method, request.url.clone());

			for (name, value) in &request.headers {
				builder = builder.header(name, value);
			}
			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await.map_err(TransportError::from)?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_owned()))
				})
				.collect();
			let body = response.bytes().await.map_err(TransportError::from)?.to_vec();

			Ok(Response { status, headers, body })
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse test URL.")
	}

	#[test]
	fn bearer_injection_overwrites_existing_header() {
		let request = Request::get(url("https://api.example.com/orders"))
			.with_header("Authorization", "Bearer stale")
			.with_bearer(&TokenSecret::new("fresh"));

		assert_eq!(request.headers.get(AUTHORIZATION).map(String::as_str), Some("Bearer fresh"));
		assert_eq!(request.headers.len(), 1);
	}

	#[test]
	fn json_body_sets_content_type() {
		let request = Request::post(url("https://api.example.com/cart"))
			.with_json(&serde_json::json!({"productId": 42}))
			.expect("JSON body should serialize.");

		assert_eq!(request.headers.get("content-type").map(String::as_str), Some("application/json"));
		assert_eq!(request.body.as_deref(), Some(br#"{"productId":42}"#.as_slice()));
	}

	#[test]
	fn response_status_helpers() {
		let ok = Response { status: 204, headers: BTreeMap::new(), body: Vec::new() };
		let unauthorized = Response { status: 401, headers: BTreeMap::new(), body: Vec::new() };
		let forbidden = Response { status: 403, headers: BTreeMap::new(), body: Vec::new() };

		assert!(ok.is_success());
		assert!(unauthorized.is_unauthorized());
		assert!(!forbidden.is_unauthorized());
		assert!(!forbidden.is_success());
	}

	#[test]
	fn malformed_json_reports_the_failing_path() {
		let response = Response {
			status: 200,
			headers: BTreeMap::new(),
			body: br#"{"token": 7}"#.to_vec(),
		};
		#[derive(Debug, serde::Deserialize)]
		struct Body {
			#[allow(dead_code)]
			token: String,
		}

		let err = response.json::<Body>().expect_err("Numeric token should fail to parse.");

		assert_eq!(err.path().to_string(), "token");
	}
}
