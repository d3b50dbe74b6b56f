//! The authenticated request coordinator.
//!
//! [`AuthRelay`] presents a request-issuing interface indistinguishable from a plain HTTP
//! client while transparently handling bearer-token attachment and one class of failure: an
//! expired access token. A `401` on a non-refresh request sends the caller through
//! [`RefreshGate`]: the first such caller performs the single refresh call, everyone else
//! queues, and all of them replay exactly once with the token captured when the refresh
//! settled. A failed refresh clears the stored credential, fires the host's
//! [`SessionExpiryHook`] once, and rejects every waiting caller.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	error::AuthExpiredError,
	gate::{GatePass, RefreshGate, RefreshOutcome},
	http::{HttpTransport, Request, Response},
	obs::{self, StageKind, StageOutcome, StageSpan},
	session::{SessionCredential, TokenSecret},
	store::CredentialStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Default refresh path, matching the backend auth service contract.
pub const DEFAULT_REFRESH_PATH: &str = "/api/v1/auth/refresh";

#[derive(Serialize)]
struct RefreshRequestBody<'a> {
	#[serde(rename = "refreshToken")]
	refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponseBody {
	token: String,
	#[serde(rename = "refreshToken", default)]
	refresh_token: Option<String>,
}

/// Endpoint configuration for the relay's dependency on the auth service.
#[derive(Clone, Debug)]
pub struct RelayEndpoints {
	refresh: Url,
}
impl RelayEndpoints {
	/// Derives the refresh endpoint from the auth service base URL.
	pub fn new(base: Url) -> Result<Self> {
		let refresh = base
			.join(DEFAULT_REFRESH_PATH)
			.map_err(|source| crate::error::ConfigError::InvalidEndpoint { source })?;

		Ok(Self { refresh })
	}

	/// Uses an explicit refresh endpoint instead of deriving one from a base URL.
	pub fn with_refresh_endpoint(refresh: Url) -> Self {
		Self { refresh }
	}

	/// Returns the configured refresh endpoint.
	pub fn refresh_endpoint(&self) -> &Url {
		&self.refresh
	}

	/// Refresh calls are exempt from 401 recovery so the protocol can never recurse.
	pub(crate) fn is_refresh(&self, url: &Url) -> bool {
		*url == self.refresh
	}
}

/// Host callback fired exactly once per unrecoverable refresh failure.
///
/// The typical implementation navigates the UI to its login entry point; the relay has
/// already cleared the stored credential by the time the hook runs.
pub trait SessionExpiryHook
where
	Self: Send + Sync,
{
	/// Invoked after a refresh failure expires the session.
	fn on_session_expired(&self);
}

/// Default hook that ignores session expiry.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopExpiryHook;
impl SessionExpiryHook for NoopExpiryHook {
	fn on_session_expired(&self) {}
}

#[cfg(feature = "reqwest")]
/// Relay specialized for the crate's default reqwest transport.
pub type ReqwestRelay = AuthRelay<ReqwestTransport>;

/// Coordinates authenticated requests against the backend services.
///
/// The relay owns the transport, the credential store, and the refresh gate; it is `Clone`
/// and cheap to share across the host application's call sites. All shared mutable state
/// (stored credential, refresh flag, replay queue) lives behind the store and gate, so a
/// cloned relay observes the same session.
pub struct AuthRelay<T>
where
	T: ?Sized + HttpTransport,
{
	/// Transport used for every outbound call, refresh included.
	pub transport: Arc<T>,
	/// Credential store holding the process-wide session.
	pub store: Arc<dyn CredentialStore>,
	/// Auth service endpoint configuration.
	pub endpoints: RelayEndpoints,
	/// Hook fired once per unrecoverable refresh failure.
	pub expiry_hook: Arc<dyn SessionExpiryHook>,
	/// Shared counters for refresh outcomes and replays.
	pub refresh_metrics: Arc<RefreshMetrics>,
	gate: RefreshGate,
}
impl<T> AuthRelay<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a relay around the caller-provided transport.
	pub fn with_transport(
		store: Arc<dyn CredentialStore>,
		endpoints: RelayEndpoints,
		transport: impl Into<Arc<T>>,
	) -> Self {
		Self {
			transport: transport.into(),
			store,
			endpoints,
			expiry_hook: Arc::new(NoopExpiryHook),
			refresh_metrics: Default::default(),
			gate: Default::default(),
		}
	}

	/// Sets or replaces the session expiry hook.
	pub fn with_expiry_hook(mut self, hook: Arc<dyn SessionExpiryHook>) -> Self {
		self.expiry_hook = hook;

		self
	}

	/// Issues a request through the relay, recovering once from an expired access token.
	///
	/// Behavior, in order: attach the stored access token when present; send; return anything
	/// other than a `401` unchanged (refresh calls are returned unchanged regardless); on a
	/// `401`, run the refresh protocol and replay this request once with the settled token. A
	/// replay that still answers `401` is returned to the caller as a normal failed response.
	pub async fn execute(&self, request: Request) -> Result<Response> {
		const KIND: StageKind = StageKind::Request;

		let span = StageSpan::new(KIND, "execute");

		obs::record_stage_outcome(KIND, StageOutcome::Attempt);

		let result = span
			.instrument(async move {
				let first = self.send_with_stored_token(request.clone()).await?;

				if !first.is_unauthorized() || self.endpoints.is_refresh(&request.url) {
					return Ok(first);
				}

				let token = self.acquire_fresh_token().await?;

				obs::record_stage_outcome(StageKind::Replay, StageOutcome::Attempt);

				let replayed = self.transport.send(request.with_bearer(&token)).await;

				obs::record_stage_outcome(
					StageKind::Replay,
					match &replayed {
						Ok(_) => StageOutcome::Success,
						Err(_) => StageOutcome::Failure,
					},
				);

				Ok(replayed?)
			})
			.await;

		match &result {
			Ok(_) => obs::record_stage_outcome(KIND, StageOutcome::Success),
			Err(_) => obs::record_stage_outcome(KIND, StageOutcome::Failure),
		}

		result
	}

	/// Convenience GET issuer.
	pub async fn get(&self, url: Url) -> Result<Response> {
		self.execute(Request::get(url)).await
	}

	/// Convenience POST issuer with a JSON body.
	pub async fn post_json<B>(&self, url: Url, body: &B) -> Result<Response>
	where
		B: ?Sized + Serialize,
	{
		self.execute(Request::post(url).with_json(body)?).await
	}

	/// Convenience PUT issuer with a JSON body.
	pub async fn put_json<B>(&self, url: Url, body: &B) -> Result<Response>
	where
		B: ?Sized + Serialize,
	{
		self.execute(Request::put(url).with_json(body)?).await
	}

	/// Convenience DELETE issuer.
	pub async fn delete(&self, url: Url) -> Result<Response> {
		self.execute(Request::delete(url)).await
	}

	/// Stores the credential issued at login.
	pub async fn sign_in(&self, credential: SessionCredential) -> Result<()> {
		Ok(self.store.save(credential).await?)
	}

	/// Clears the stored credential; access token, refresh token, and user data go together.
	pub async fn sign_out(&self) -> Result<()> {
		Ok(self.store.clear().await?)
	}

	/// Returns the stored credential, if a session is active.
	pub async fn session(&self) -> Result<Option<SessionCredential>> {
		Ok(self.store.load().await?)
	}

	/// Forces a refresh through the gate, returning the rotated access token.
	///
	/// Subject to the same serialization as 401-triggered refreshes: if one is already in
	/// flight this call queues behind it instead of issuing a second refresh call.
	pub async fn refresh_now(&self) -> Result<TokenSecret> {
		self.acquire_fresh_token().await
	}

	/// Returns the number of requests currently queued behind an in-flight refresh.
	pub fn pending_replays(&self) -> usize {
		self.gate.queued()
	}

	async fn send_with_stored_token(&self, request: Request) -> Result<Response> {
		let request = match self.store.load().await? {
			Some(credential) => request.with_bearer(&credential.access_token),
			None => request,
		};

		Ok(self.transport.send(request).await?)
	}

	/// Runs the `Idle -> Refreshing -> Idle` transition for this caller.
	async fn acquire_fresh_token(&self) -> Result<TokenSecret> {
		match self.gate.enter() {
			GatePass::Queued(waiter) => match waiter.outcome().await {
				RefreshOutcome::Rotated(token) => Ok(token),
				RefreshOutcome::Expired => Err(AuthExpiredError::Lapsed.into()),
			},
			GatePass::Refresher(slot) => {
				const KIND: StageKind = StageKind::Refresh;

				let span = StageSpan::new(KIND, "acquire_fresh_token");

				obs::record_stage_outcome(KIND, StageOutcome::Attempt);
				self.refresh_metrics.record_attempt();

				let outcome = span.instrument(self.refresh_session()).await;

				match outcome {
					Ok(token) => {
						let dispatched = slot.settle(RefreshOutcome::Rotated(token.clone()));

						self.refresh_metrics.record_success();
						self.refresh_metrics.record_replayed(dispatched as u64);
						obs::record_stage_outcome(KIND, StageOutcome::Success);

						Ok(token)
					},
					Err(err) => {
						slot.settle(RefreshOutcome::Expired);
						self.refresh_metrics.record_failure();
						obs::record_stage_outcome(KIND, StageOutcome::Failure);

						// The session is gone either way; a failing clear must not mask the
						// refresh error.
						let _ = self.store.clear().await;

						self.expiry_hook.on_session_expired();

						Err(err)
					},
				}
			},
		}
	}

	/// Performs the single refresh call and rotates the stored credential.
	async fn refresh_session(&self) -> Result<TokenSecret> {
		let credential = self
			.store
			.load()
			.await?
			.ok_or(AuthExpiredError::MissingRefreshToken)?;
		let refresh_token = credential
			.refresh_token
			.clone()
			.ok_or(AuthExpiredError::MissingRefreshToken)?;
		let request = Request::post(self.endpoints.refresh_endpoint().clone())
			.with_json(&RefreshRequestBody { refresh_token: refresh_token.expose() })?;
		let response = self.transport.send(request).await.map_err(|e| {
			AuthExpiredError::RefreshTransport { source: Box::new(e) }
		})?;

		if !response.is_success() {
			return Err(AuthExpiredError::RefreshRejected { status: response.status }.into());
		}

		let body: RefreshResponseBody = response.json().map_err(|source| {
			AuthExpiredError::RefreshResponseParse { source, status: response.status }
		})?;
		let rotated = credential.rotated(body.token, body.refresh_token);

		self.store.save(rotated.clone()).await?;

		Ok(rotated.access_token)
	}
}
// A derived impl would demand `T: Clone`; only the `Arc` handles are cloned.
impl<T> Clone for AuthRelay<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			store: self.store.clone(),
			endpoints: self.endpoints.clone(),
			expiry_hook: self.expiry_hook.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
			gate: self.gate.clone(),
		}
	}
}
#[cfg(feature = "reqwest")]
impl AuthRelay<ReqwestTransport> {
	/// Creates a relay with the crate's default reqwest transport.
	pub fn new(store: Arc<dyn CredentialStore>, endpoints: RelayEndpoints) -> Self {
		Self::with_transport(store, endpoints, ReqwestTransport::default())
	}
}
impl<T> Debug for AuthRelay<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthRelay")
			.field("refresh_endpoint", &self.endpoints.refresh_endpoint().as_str())
			.field("pending_replays", &self.gate.queued())
			.finish()
	}
}
