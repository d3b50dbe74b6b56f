//! Persisted session credential record, rotation helpers, and builder.

// self
use crate::_prelude::*;

/// Opaque bearer token kept out of logs.
///
/// Both the short-lived access token and the longer-lived refresh token use this wrapper. The
/// raw value leaves only through [`expose`](Self::expose) (wire bodies) or the rendered
/// [`bearer_header`](Self::bearer_header) (the `Authorization` header).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new token value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the raw token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Renders the `Authorization` header value for this token.
	pub fn bearer_header(&self) -> String {
		format!("Bearer {}", self.0)
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Errors produced by [`SessionCredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
}

/// Process-wide session credential persisted by a [`CredentialStore`](crate::store::CredentialStore).
///
/// The three persisted fields (`accessToken`, `refreshToken`, `userData`) live and die
/// together: the record is created at login, replaced wholesale on a successful refresh, and
/// cleared on logout or unrecoverable refresh failure.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionCredential {
	/// Short-lived access token sent with every authenticated request.
	#[serde(rename = "accessToken")]
	pub access_token: TokenSecret,
	/// Longer-lived refresh token used solely to obtain a new access token.
	#[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Serialized user profile carried alongside the tokens.
	#[serde(rename = "userData", default, skip_serializing_if = "Option::is_none")]
	pub user_data: Option<serde_json::Value>,
	/// Instant the access token was issued (login or the most recent rotation).
	#[serde(rename = "issuedAt")]
	pub issued_at: OffsetDateTime,
}
impl SessionCredential {
	/// Returns a builder for constructing a credential at login time.
	pub fn builder(access_token: impl Into<String>) -> SessionCredentialBuilder {
		SessionCredentialBuilder::new(access_token)
	}

	/// Produces the successor credential after a refresh settles.
	///
	/// The user profile carries over unchanged. The refresh token is replaced only when the
	/// endpoint rotated it; otherwise the stored one remains valid and is kept.
	pub fn rotated(
		&self,
		access_token: impl Into<String>,
		refresh_token: Option<String>,
	) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: refresh_token.map(TokenSecret::new).or_else(|| self.refresh_token.clone()),
			user_data: self.user_data.clone(),
			issued_at: OffsetDateTime::now_utc(),
		}
	}
}
impl Debug for SessionCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionCredential")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("user_data_set", &self.user_data.is_some())
			.field("issued_at", &self.issued_at)
			.finish()
	}
}

/// Builder for [`SessionCredential`].
#[derive(Clone, Debug)]
pub struct SessionCredentialBuilder {
	access_token: String,
	refresh_token: Option<TokenSecret>,
	user_data: Option<serde_json::Value>,
	issued_at: Option<OffsetDateTime>,
}
impl SessionCredentialBuilder {
	fn new(access_token: impl Into<String>) -> Self {
		Self {
			access_token: access_token.into(),
			refresh_token: None,
			user_data: None,
			issued_at: None,
		}
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Attaches the serialized user profile.
	pub fn user_data(mut self, data: serde_json::Value) -> Self {
		self.user_data = Some(data);

		self
	}

	/// Sets the issued-at instant; defaults to the current clock.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Consumes the builder and produces a [`SessionCredential`].
	pub fn build(self) -> Result<SessionCredential, CredentialBuilderError> {
		if self.access_token.is_empty() {
			return Err(CredentialBuilderError::MissingAccessToken);
		}

		Ok(SessionCredential {
			access_token: TokenSecret::new(self.access_token),
			refresh_token: self.refresh_token,
			user_data: self.user_data,
			issued_at: self.issued_at.unwrap_or_else(OffsetDateTime::now_utc),
		})
	}
}
