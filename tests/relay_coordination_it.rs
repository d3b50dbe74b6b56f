//! Deterministic coordination tests driving the relay through a scripted transport.
//!
//! A semaphore parks the in-flight refresh call so the test can line up queued requests one by
//! one before letting the refresh settle, making the single-refresh and FIFO-dispatch
//! guarantees observable without races.

// std
use std::{
	collections::{HashMap, VecDeque},
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};
// crates.io
use tokio::sync::Semaphore;
// self
use auth_relay::{
	error::{AuthExpiredError, Error, TransportError},
	http::{HttpTransport, Request, Response, TransportFuture},
	relay::{AuthRelay, RelayEndpoints, SessionExpiryHook},
	session::SessionCredential,
	store::MemoryStore,
	url::Url,
};

const REFRESH_KEY: &str = "POST /api/v1/auth/refresh";

#[derive(Debug, Default)]
struct CountingHook(AtomicUsize);
impl CountingHook {
	fn fired(&self) -> usize {
		self.0.load(Ordering::SeqCst)
	}
}
impl SessionExpiryHook for CountingHook {
	fn on_session_expired(&self) {
		self.0.fetch_add(1, Ordering::SeqCst);
	}
}

/// Transport that replies from a per-endpoint script and records every dispatch.
#[derive(Default)]
struct ScriptedTransport {
	replies: Mutex<HashMap<String, VecDeque<Response>>>,
	failures: Mutex<HashMap<String, VecDeque<String>>>,
	log: Mutex<Vec<(String, Option<String>)>>,
	holds: Mutex<HashMap<String, Arc<Semaphore>>>,
}
impl ScriptedTransport {
	fn script(&self, key: &str, responses: impl IntoIterator<Item = Response>) {
		self.replies
			.lock()
			.expect("Reply script lock should not be poisoned.")
			.entry(key.into())
			.or_default()
			.extend(responses);
	}

	/// Makes the next dispatch to `key` die in transport instead of producing a response.
	fn script_failure(&self, key: &str, message: &str) {
		self.failures
			.lock()
			.expect("Failure script lock should not be poisoned.")
			.entry(key.into())
			.or_default()
			.push_back(message.into());
	}

	/// Parks dispatches to `key` until the returned semaphore receives permits.
	fn hold(&self, key: &str) -> Arc<Semaphore> {
		let semaphore = Arc::new(Semaphore::new(0));

		self.holds
			.lock()
			.expect("Hold lock should not be poisoned.")
			.insert(key.into(), semaphore.clone());

		semaphore
	}

	fn dispatches(&self) -> Vec<(String, Option<String>)> {
		self.log.lock().expect("Dispatch log lock should not be poisoned.").clone()
	}

	fn dispatches_to(&self, key: &str) -> usize {
		self.dispatches().iter().filter(|(logged, _)| logged == key).count()
	}
}
impl HttpTransport for ScriptedTransport {
	fn send(&self, request: Request) -> TransportFuture<'_> {
		Box::pin(async move {
			let key = format!("{} {}", request.method, request.url.path());
			let bearer = request.headers.get("authorization").cloned();

			self.log
				.lock()
				.expect("Dispatch log lock should not be poisoned.")
				.push((key.clone(), bearer));

			let hold = self
				.holds
				.lock()
				.expect("Hold lock should not be poisoned.")
				.get(&key)
				.cloned();

			if let Some(semaphore) = hold {
				semaphore
					.acquire()
					.await
					.expect("Hold semaphore should stay open for the test's lifetime.")
					.forget();
			}

			let failure = self
				.failures
				.lock()
				.expect("Failure script lock should not be poisoned.")
				.get_mut(&key)
				.and_then(VecDeque::pop_front);

			if let Some(message) = failure {
				return Err(TransportError::network(std::io::Error::other(message)));
			}

			let reply = self
				.replies
				.lock()
				.expect("Reply script lock should not be poisoned.")
				.get_mut(&key)
				.and_then(VecDeque::pop_front);

			Ok(reply.unwrap_or_else(|| response(404, b"")))
		})
	}
}

fn response(status: u16, body: &[u8]) -> Response {
	Response { status, headers: Default::default(), body: body.to_vec() }
}

fn service_url(path: &str) -> Url {
	Url::parse(&format!("https://svc.example.com{path}"))
		.expect("Service URL fixture should parse.")
}

async fn build_relay(
	transport: Arc<ScriptedTransport>,
) -> (AuthRelay<ScriptedTransport>, Arc<CountingHook>) {
	let hook = Arc::new(CountingHook::default());
	let relay = AuthRelay::with_transport(
		Arc::new(MemoryStore::default()),
		RelayEndpoints::with_refresh_endpoint(service_url("/api/v1/auth/refresh")),
		transport,
	)
	.with_expiry_hook(hook.clone());
	let credential = SessionCredential::builder("t1")
		.refresh_token("r1")
		.build()
		.expect("Credential fixture should build successfully.");

	relay.sign_in(credential).await.expect("Failed to seed session credential.");

	(relay, hook)
}

async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
	for _ in 0..10_000 {
		if condition() {
			return;
		}

		tokio::task::yield_now().await;
	}

	panic!("Timed out waiting for {what}.");
}

#[tokio::test]
async fn concurrent_expirations_share_a_single_refresh_call() {
	let transport = Arc::new(ScriptedTransport::default());

	for path in ["/a", "/b", "/c"] {
		transport.script(&format!("GET {path}"), [response(401, b""), response(200, b"ok")]);
	}

	transport.script(REFRESH_KEY, [response(200, br#"{"token":"t2","refreshToken":"r2"}"#)]);

	let gate = transport.hold(REFRESH_KEY);
	let (relay, hook) = build_relay(transport.clone()).await;

	// First caller loses its token, wins the refresher slot, and parks inside the held
	// refresh call.
	let first = tokio::spawn({
		let relay = relay.clone();

		async move { relay.get(service_url("/a")).await }
	});

	wait_until(|| transport.dispatches_to(REFRESH_KEY) == 1, "the refresher to start").await;

	// Later callers must queue in arrival order rather than issuing their own refresh.
	let second = tokio::spawn({
		let relay = relay.clone();

		async move { relay.get(service_url("/b")).await }
	});

	wait_until(|| relay.pending_replays() == 1, "the second caller to queue").await;

	let third = tokio::spawn({
		let relay = relay.clone();

		async move { relay.get(service_url("/c")).await }
	});

	wait_until(|| relay.pending_replays() == 2, "the third caller to queue").await;
	gate.add_permits(1);

	let first = first.await.expect("First task should not panic.");
	let second = second.await.expect("Second task should not panic.");
	let third = third.await.expect("Third task should not panic.");

	for result in [first, second, third] {
		let response = result.expect("Every queued request should resolve after the rotation.");

		assert_eq!(response.status, 200);
		assert_eq!(response.body, b"ok");
	}

	assert_eq!(transport.dispatches_to(REFRESH_KEY), 1, "Exactly one refresh call is issued.");
	assert_eq!(relay.refresh_metrics.attempts(), 1);
	assert_eq!(relay.refresh_metrics.replayed(), 2);
	assert_eq!(hook.fired(), 0);

	let replays: Vec<_> = transport
		.dispatches()
		.into_iter()
		.filter(|(_, bearer)| bearer.as_deref() == Some("Bearer t2"))
		.map(|(key, _)| key)
		.collect();

	// The refresher replays first; queued requests are dispatched in enqueue order.
	assert_eq!(replays, ["GET /a", "GET /b", "GET /c"], "Replays must dispatch FIFO.");
}

#[tokio::test]
async fn failed_refresh_fans_out_to_every_queued_request() {
	let transport = Arc::new(ScriptedTransport::default());

	for path in ["/a", "/b"] {
		transport.script(&format!("GET {path}"), [response(401, b"")]);
	}

	transport.script(REFRESH_KEY, [response(401, br#"{"message":"expired"}"#)]);

	let gate = transport.hold(REFRESH_KEY);
	let (relay, hook) = build_relay(transport.clone()).await;
	let first = tokio::spawn({
		let relay = relay.clone();

		async move { relay.get(service_url("/a")).await }
	});

	wait_until(|| transport.dispatches_to(REFRESH_KEY) == 1, "the refresher to start").await;

	let second = tokio::spawn({
		let relay = relay.clone();

		async move { relay.get(service_url("/b")).await }
	});

	wait_until(|| relay.pending_replays() == 1, "the second caller to queue").await;
	gate.add_permits(1);

	let first = first.await.expect("First task should not panic.");
	let second = second.await.expect("Second task should not panic.");
	let refresher_err =
		first.expect_err("The refresher's request should reject with an auth-expired error.");
	let queued_err =
		second.expect_err("The queued request should reject with an auth-expired error.");

	assert!(matches!(
		refresher_err,
		Error::AuthExpired(AuthExpiredError::RefreshRejected { status: 401 }),
	));
	assert!(matches!(queued_err, Error::AuthExpired(AuthExpiredError::Lapsed)));
	assert_eq!(hook.fired(), 1, "Exactly one redirect side effect fires.");
	assert!(
		relay.session().await.expect("Session load should succeed.").is_none(),
		"Stored credential should be cleared after the failed refresh.",
	);
	assert_eq!(transport.dispatches_to(REFRESH_KEY), 1);
	assert_eq!(relay.refresh_metrics.failures(), 1);

	// No replays were dispatched against the old or new token.
	assert_eq!(transport.dispatches_to("GET /a"), 1);
	assert_eq!(transport.dispatches_to("GET /b"), 1);
}

#[tokio::test]
async fn refresh_call_dying_in_transport_expires_the_session() {
	let transport = Arc::new(ScriptedTransport::default());

	transport.script("GET /a", [response(401, b"")]);
	transport.script_failure(REFRESH_KEY, "connection reset by peer");

	let (relay, hook) = build_relay(transport.clone()).await;
	let err = relay
		.get(service_url("/a"))
		.await
		.expect_err("A refresh that dies in transport should reject with an auth-expired error.");

	assert!(matches!(err, Error::AuthExpired(AuthExpiredError::RefreshTransport { .. })));
	assert!(err.is_auth_expired());
	assert_eq!(hook.fired(), 1, "Exactly one redirect side effect fires.");
	assert!(
		relay.session().await.expect("Session load should succeed.").is_none(),
		"Stored credential should be cleared after the dead refresh.",
	);
	assert_eq!(relay.refresh_metrics.failures(), 1);
	assert_eq!(transport.dispatches_to(REFRESH_KEY), 1);
	assert_eq!(transport.dispatches_to("GET /a"), 1, "No replay is dispatched.");
}

#[tokio::test]
async fn forced_refresh_queues_behind_an_in_flight_one() {
	let transport = Arc::new(ScriptedTransport::default());

	transport.script("GET /a", [response(401, b""), response(200, b"ok")]);
	transport.script(REFRESH_KEY, [response(200, br#"{"token":"t2"}"#)]);

	let gate = transport.hold(REFRESH_KEY);
	let (relay, _) = build_relay(transport.clone()).await;
	let first = tokio::spawn({
		let relay = relay.clone();

		async move { relay.get(service_url("/a")).await }
	});

	wait_until(|| transport.dispatches_to(REFRESH_KEY) == 1, "the refresher to start").await;

	let forced = tokio::spawn({
		let relay = relay.clone();

		async move { relay.refresh_now().await }
	});

	wait_until(|| relay.pending_replays() == 1, "the forced refresh to queue").await;
	gate.add_permits(1);

	let response = first
		.await
		.expect("First task should not panic.")
		.expect("Recovered request should resolve.");
	let token = forced
		.await
		.expect("Forced refresh task should not panic.")
		.expect("Forced refresh should observe the shared rotation.");

	assert_eq!(response.status, 200);
	assert_eq!(token.expose(), "t2");
	assert_eq!(transport.dispatches_to(REFRESH_KEY), 1, "The forced refresh shares the call.");
}
