use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};

use crate::email::is_plausible_email;
use crate::error::Error;

/// Provider-assigned user identifier (opaque string, usually a UUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Syntactically plausible email address.
///
/// Holding an `Email` proves the input passed the pre-flight check, so it can be
/// sent to the provider. Use `"a@x.test".parse::<Email>()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl TryFrom<String> for Email {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let s = s.trim().to_owned();
        if is_plausible_email(&s) {
            Ok(Self(s))
        } else {
            Err(Error::Validation(format!("'{s}' is not a valid email address")))
        }
    }
}

impl From<Email> for String {
    fn from(e: Email) -> Self {
        e.0
    }
}

/// Non-empty password, checked before it leaves the process.
///
/// Strength rules belong to the provider.
pub(crate) fn validate_password(password: &str) -> Result<(), Error> {
    if password.is_empty() {
        return Err(Error::Validation("password must not be empty".into()));
    }
    Ok(())
}

/// Identity record as reported by the provider.
///
/// Replaced wholesale on every auth event, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
    #[serde(default)]
    pub app_metadata: Map<String, Value>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub email_confirmed_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl User {
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            email: email.into(),
            user_metadata: Map::new(),
            app_metadata: Map::new(),
            email_confirmed_at: None,
            created_at: None,
        }
    }

    #[must_use]
    pub fn with_user_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.user_metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_email_confirmed_at(mut self, at: OffsetDateTime) -> Self {
        self.email_confirmed_at = Some(at);
        self
    }

    #[must_use]
    pub fn with_created_at(mut self, at: OffsetDateTime) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Whether the provider has confirmed the user's email.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }
}

/// Verified, time-bounded identity binding for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".into()
}

impl Session {
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: OffsetDateTime,
        user: User,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            token_type: default_token_type(),
            expires_at,
            user,
        }
    }

    /// `true` once fewer than `margin` remain before the access token expires.
    #[must_use]
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at - OffsetDateTime::now_utc() <= margin
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::ZERO)
    }
}

/// Kind of auth-state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    #[display("SIGNED_IN")]
    SignedIn,
    #[display("SIGNED_OUT")]
    SignedOut,
    #[display("TOKEN_REFRESHED")]
    TokenRefreshed,
    #[display("USER_UPDATED")]
    UserUpdated,
}

/// Auth-state change delivered to subscribers. Never persisted.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct AuthChangeEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthChangeEvent {
    #[must_use]
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }

    /// User carried by the event, `None` for sign-out.
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }
}

/// Result of a sign-up.
///
/// Providers either start a session straight away or hold the account until
/// the email is confirmed. Both are success; callers decide what to show.
#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    Active(Session),
    PendingConfirmation(User),
}

impl SignUpOutcome {
    #[must_use]
    pub fn user(&self) -> &User {
        match self {
            Self::Active(session) => &session.user,
            Self::PendingConfirmation(user) => user,
        }
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Active(session) => Some(session),
            Self::PendingConfirmation(_) => None,
        }
    }
}

/// Changes requested through `update_user`. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl UserAttributes {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if let Some(email) = &self.email {
            email.parse::<Email>()?;
        }
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new("3f1c", "a@x.test")
    }

    #[test]
    fn email_parses_and_trims() {
        let email: Email = " a@x.test ".parse().unwrap();
        assert_eq!(email.as_str(), "a@x.test");
    }

    #[test]
    fn email_rejects_garbage_as_validation_error() {
        let err = "not-an-email".parse::<Email>().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn empty_password_is_rejected() {
        assert!(matches!(validate_password(""), Err(Error::Validation(_))));
        assert!(validate_password("x").is_ok());
    }

    #[test]
    fn user_deserializes_from_provider_json() {
        let json = r#"{
            "id": "3f1c",
            "email": "a@x.test",
            "user_metadata": {"name": "A"},
            "email_confirmed_at": "2024-05-01T10:00:00Z",
            "aud": "authenticated"
        }"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.id.to_string(), "3f1c");
        assert_eq!(user.user_metadata["name"], "A");
        assert!(user.is_confirmed());
        assert!(user.app_metadata.is_empty());
    }

    #[test]
    fn session_persists_expiry_as_unix_seconds() {
        let expires_at = OffsetDateTime::from_unix_timestamp(1_900_000_000).unwrap();
        let session = Session::new("at", "rt", expires_at, user());
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["expires_at"], 1_900_000_000);
        let back: Session = serde_json::from_value(json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn session_expiry_margin() {
        let soon = Session::new("at", "rt", OffsetDateTime::now_utc() + Duration::seconds(5), user());
        assert!(soon.expires_within(Duration::seconds(10)));
        assert!(!soon.is_expired());

        let later = Session::new("at", "rt", OffsetDateTime::now_utc() + Duration::hours(1), user());
        assert!(!later.expires_within(Duration::seconds(10)));
    }

    #[test]
    fn event_kind_display_matches_wire_names() {
        assert_eq!(AuthEventKind::SignedIn.to_string(), "SIGNED_IN");
        assert_eq!(
            serde_json::to_string(&AuthEventKind::TokenRefreshed).unwrap(),
            "\"TOKEN_REFRESHED\""
        );
    }

    #[test]
    fn signed_out_event_has_no_user() {
        let event = AuthChangeEvent::new(AuthEventKind::SignedOut, None);
        assert!(event.user().is_none());
    }

    #[test]
    fn sign_up_outcome_exposes_user_in_both_variants() {
        let pending = SignUpOutcome::PendingConfirmation(user());
        assert_eq!(pending.user().email, "a@x.test");
        assert!(pending.session().is_none());

        let active = SignUpOutcome::Active(Session::new("at", "rt", OffsetDateTime::now_utc(), user()));
        assert_eq!(active.user().email, "a@x.test");
        assert!(active.session().is_some());
    }

    #[test]
    fn user_attributes_validate_before_sending() {
        let bad = UserAttributes {
            email: Some("nope".into()),
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(Error::Validation(_))));

        let json = serde_json::to_value(UserAttributes {
            password: Some("new-secret".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"password": "new-secret"}));
    }
}
