use serde::Deserialize;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::config::ProviderConfig;
use crate::error::Error;
use crate::provider::IdentityProvider;
use crate::types::{Email, Session, SignUpOutcome, User, UserAttributes};

const AUTH_PREFIX: &str = "auth/v1";

/// Token response from the provider's token and sign-up endpoints.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    refresh_token: String,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
            .unwrap_or_else(|| {
                OffsetDateTime::now_utc() + Duration::seconds(self.expires_in.unwrap_or(3600))
            });
        let mut session = Session::new(self.access_token, self.refresh_token, expires_at, self.user);
        if let Some(token_type) = self.token_type {
            session.token_type = token_type;
        }
        session
    }
}

/// Sign-up answers with a session when confirmation is off, a bare user otherwise.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(Box<TokenResponse>),
    User(User),
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn detail(&self) -> Option<&str> {
        self.error_description
            .as_deref()
            .or(self.msg.as_deref())
            .or(self.message.as_deref())
            .or(self.error.as_deref())
    }
}

/// REST client for a GoTrue-compatible identity provider.
pub struct HttpProvider {
    base_url: Url,
    api_key: String,
    http: reqwest::Client,
}

impl HttpProvider {
    #[must_use]
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            base_url: config.url().clone(),
            api_key: config.api_key().to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let base = self.base_url.path().trim_end_matches('/');
        url.set_path(&format!("{base}/{AUTH_PREFIX}/{path}"));
        url
    }

    /// Request authorized by the API key alone.
    fn anon(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("apikey", &self.api_key).bearer_auth(&self.api_key)
    }

    /// Request authorized as the user behind `access_token`.
    fn as_user(&self, builder: reqwest::RequestBuilder, access_token: &str) -> reqwest::RequestBuilder {
        builder.header("apikey", &self.api_key).bearer_auth(access_token)
    }

    /// Turn a non-success response into a provider error with details.
    async fn failure(response: reqwest::Response, operation: &'static str) -> Error {
        let status = response.status().as_u16();
        let body = Self::error_body(response).await;
        let detail = body.detail().unwrap_or("unexpected response").to_string();
        tracing::warn!(operation, status, detail = %detail, "Identity provider request failed");
        Error::provider(operation, Some(status), detail)
    }

    async fn error_body(response: reqwest::Response) -> ErrorBody {
        let text = response.text().await.unwrap_or_default();
        serde_json::from_str(&text).unwrap_or_default()
    }
}

impl IdentityProvider for HttpProvider {
    async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        redirect_to: Option<&str>,
    ) -> Result<SignUpOutcome, Error> {
        let mut url = self.endpoint("signup");
        if let Some(redirect_to) = redirect_to {
            url.query_pairs_mut().append_pair("redirect_to", redirect_to);
        }
        let response = self
            .anon(self.http.post(url))
            .json(&json!({ "email": email.as_str(), "password": password }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, "sign up").await);
        }
        Ok(match response.json::<SignUpResponse>().await? {
            SignUpResponse::Session(tokens) => SignUpOutcome::Active(tokens.into_session()),
            SignUpResponse::User(user) => SignUpOutcome::PendingConfirmation(user),
        })
    }

    async fn sign_in_with_password(&self, email: &Email, password: &str) -> Result<Session, Error> {
        let mut url = self.endpoint("token");
        url.query_pairs_mut().append_pair("grant_type", "password");
        let response = self
            .anon(self.http.post(url))
            .json(&json!({ "email": email.as_str(), "password": password }))
            .send()
            .await?;

        match response.status().as_u16() {
            200..=299 => {}
            400 => {
                let body = Self::error_body(response).await;
                // unconfirmed email is also a 400, but not a credentials problem
                if body.error_code.as_deref() == Some("email_not_confirmed") {
                    let detail = body.detail().unwrap_or("email not confirmed").to_string();
                    return Err(Error::provider("sign in", Some(400), detail));
                }
                return Err(Error::InvalidCredentials);
            }
            _ => return Err(Self::failure(response, "sign in").await),
        }
        Ok(response.json::<TokenResponse>().await?.into_session())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, Error> {
        let mut url = self.endpoint("token");
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");
        let response = self
            .anon(self.http.post(url))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        match response.status().as_u16() {
            200..=299 => {}
            400 | 401 => return Err(Error::Unauthenticated),
            _ => return Err(Self::failure(response, "token refresh").await),
        }
        Ok(response.json::<TokenResponse>().await?.into_session())
    }

    async fn get_user(&self, access_token: &str) -> Result<User, Error> {
        let response = self
            .as_user(self.http.get(self.endpoint("user")), access_token)
            .send()
            .await?;

        match response.status().as_u16() {
            200..=299 => {}
            401 | 403 => return Err(Error::Unauthenticated),
            _ => return Err(Self::failure(response, "get user").await),
        }
        response.json::<User>().await.map_err(Into::into)
    }

    async fn update_user(&self, access_token: &str, attributes: &UserAttributes) -> Result<User, Error> {
        let response = self
            .as_user(self.http.put(self.endpoint("user")), access_token)
            .json(attributes)
            .send()
            .await?;

        match response.status().as_u16() {
            200..=299 => {}
            401 | 403 => return Err(Error::Unauthenticated),
            _ => return Err(Self::failure(response, "update user").await),
        }
        response.json::<User>().await.map_err(Into::into)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), Error> {
        let mut url = self.endpoint("logout");
        // this device only
        url.query_pairs_mut().append_pair("scope", "local");
        let response = self.as_user(self.http.post(url), access_token).send().await?;

        match response.status().as_u16() {
            200..=299 => Ok(()),
            401 | 403 | 404 => Err(Error::Unauthenticated),
            _ => Err(Self::failure(response, "sign out").await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyKind;

    fn provider(url: &str) -> HttpProvider {
        HttpProvider::new(&ProviderConfig::new(url.parse().unwrap(), "abc", KeyKind::Anon))
    }

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(
            provider("https://x.test").endpoint("token").as_str(),
            "https://x.test/auth/v1/token"
        );
        assert_eq!(
            provider("https://x.test/base/").endpoint("user").as_str(),
            "https://x.test/base/auth/v1/user"
        );
    }

    #[test]
    fn test_token_response_prefers_absolute_expiry() {
        let json = r#"{
            "access_token": "at", "token_type": "bearer", "expires_in": 3600,
            "expires_at": 1900000000, "refresh_token": "rt",
            "user": {"id": "u1", "email": "a@x.test"}
        }"#;
        let session = serde_json::from_str::<TokenResponse>(json).unwrap().into_session();
        assert_eq!(session.expires_at.unix_timestamp(), 1_900_000_000);
        assert_eq!(session.user.email, "a@x.test");
    }

    #[test]
    fn test_sign_up_response_shapes() {
        let pending: SignUpResponse =
            serde_json::from_str(r#"{"id": "u1", "email": "a@x.test", "confirmation_sent_at": "2024-05-01T10:00:00Z"}"#)
                .unwrap();
        assert!(matches!(pending, SignUpResponse::User(_)));

        let active: SignUpResponse = serde_json::from_str(
            r#"{"access_token": "at", "expires_in": 3600, "refresh_token": "rt", "user": {"id": "u1"}}"#,
        )
        .unwrap();
        assert!(matches!(active, SignUpResponse::Session(_)));
    }

    #[test]
    fn test_error_body_detail_precedence() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error": "invalid_grant", "error_description": "Invalid login credentials"}"#)
                .unwrap();
        assert_eq!(body.detail(), Some("Invalid login credentials"));
        assert_eq!(ErrorBody::default().detail(), None);
    }
}
