//! Client-side authenticated HTTP coordinator: bearer injection, serialized token refresh, and
//! FIFO replay of requests caught behind a rotation.
//!
//! The crate wraps an [`HttpTransport`](http::HttpTransport) so callers issue requests through
//! [`AuthRelay`](relay::AuthRelay) exactly as they would through a plain HTTP client. The relay
//! attaches the stored access token to every outbound call, recognizes a `401` as the sole
//! recovery trigger, funnels concurrent expirations through a single refresh call via
//! [`RefreshGate`](gate::RefreshGate), and fans an unrecoverable failure out to every waiting
//! caller while clearing the stored session.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod error;
pub mod gate;
pub mod http;
pub mod obs;
pub mod relay;
pub mod session;
pub mod store;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use httpmock as _;
