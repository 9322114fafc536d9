//! In-process identity provider for tests and local development.

use std::collections::HashMap;
use std::future::{Future, ready};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use rand::Rng;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use crate::error::Error;
use crate::provider::IdentityProvider;
use crate::types::{Email, Session, SignUpOutcome, User, UserAttributes, UserId};

const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    user: User,
    salt: String,
    password_digest: String,
}

struct Grant {
    user_id: UserId,
    refresh_token: String,
    expires_at: OffsetDateTime,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    // access token -> grant
    grants: HashMap<String, Grant>,
    // refresh token -> user
    refresh_tokens: HashMap<String, UserId>,
    // spent refresh token -> (its successor, when it was spent)
    rotated: HashMap<String, (String, OffsetDateTime)>,
}

impl State {
    fn account_by_id(&mut self, id: &UserId) -> Option<&mut Account> {
        self.accounts.values_mut().find(|a| a.user.id == *id)
    }
}

/// Deterministic stand-in for the hosted identity provider.
///
/// Mirrors the provider's observable rules: duplicate emails and short
/// passwords are refused, refresh tokens rotate on use, and unconfirmed
/// accounts cannot sign in when email confirmation is required.
pub struct InMemoryProvider {
    state: Mutex<State>,
    requests: AtomicUsize,
    unavailable: AtomicBool,
    require_confirmation: bool,
    access_ttl: Duration,
    reuse_interval: Duration,
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            requests: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            require_confirmation: false,
            access_ttl: Duration::hours(1),
            reuse_interval: Duration::ZERO,
        }
    }

    /// Hold new accounts until [`confirm_email`](Self::confirm_email).
    #[must_use]
    pub fn with_email_confirmation(mut self, required: bool) -> Self {
        self.require_confirmation = required;
        self
    }

    #[must_use]
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    /// Accept a just-spent refresh token for `interval` after rotation,
    /// answering with the successor session. Off by default.
    #[must_use]
    pub fn with_refresh_reuse_interval(mut self, interval: Duration) -> Self {
        self.reuse_interval = interval;
        self
    }

    /// Create a confirmed account directly, bypassing sign-up.
    pub fn register(&self, email: &str, password: &str) -> User {
        let user = User::new(generate_user_id(), email.to_lowercase())
            .with_email_confirmed_at(OffsetDateTime::now_utc())
            .with_created_at(OffsetDateTime::now_utc());
        self.insert_account(user.clone(), password);
        user
    }

    pub fn confirm_email(&self, email: &str) {
        if let Some(account) = self.state.lock().accounts.get_mut(&email.to_lowercase()) {
            account.user.email_confirmed_at = Some(OffsetDateTime::now_utc());
        }
    }

    /// Make every issued access token stale.
    pub fn expire_access_tokens(&self) {
        let past = OffsetDateTime::now_utc() - Duration::seconds(1);
        for grant in self.state.lock().grants.values_mut() {
            grant.expires_at = past;
        }
    }

    pub fn revoke_refresh_tokens(&self) {
        let mut state = self.state.lock();
        state.refresh_tokens.clear();
        state.rotated.clear();
    }

    /// Fail every request with a provider error while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Requests received so far, including failed ones.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn begin(&self, operation: &'static str) -> Result<(), Error> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::provider(operation, Some(503), "service unavailable"));
        }
        Ok(())
    }

    fn insert_account(&self, user: User, password: &str) {
        let salt = generate_token();
        let account = Account {
            password_digest: digest_password(&salt, password),
            salt,
            user,
        };
        self.state.lock().accounts.insert(account.user.email.clone(), account);
    }

    fn issue(&self, state: &mut State, user: User) -> Session {
        self.issue_with(state, user, generate_token())
    }

    fn issue_with(&self, state: &mut State, user: User, refresh_token: String) -> Session {
        let access_token = generate_token();
        let expires_at = OffsetDateTime::now_utc() + self.access_ttl;
        state.grants.insert(
            access_token.clone(),
            Grant {
                user_id: user.id.clone(),
                refresh_token: refresh_token.clone(),
                expires_at,
            },
        );
        state.refresh_tokens.insert(refresh_token.clone(), user.id.clone());
        Session::new(access_token, refresh_token, expires_at, user)
    }

    fn authorize<'a>(state: &'a mut State, access_token: &str) -> Result<&'a mut Account, Error> {
        let user_id = match state.grants.get(access_token) {
            Some(grant) if grant.expires_at > OffsetDateTime::now_utc() => grant.user_id.clone(),
            _ => return Err(Error::Unauthenticated),
        };
        state.account_by_id(&user_id).ok_or(Error::Unauthenticated)
    }

    fn do_sign_up(&self, email: &Email, password: &str) -> Result<SignUpOutcome, Error> {
        self.begin("sign up")?;
        let key = email.as_str().to_lowercase();
        if self.state.lock().accounts.contains_key(&key) {
            return Err(Error::provider("sign up", Some(422), "User already registered"));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(Error::provider(
                "sign up",
                Some(422),
                format!("Password should be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }

        let mut user = User::new(generate_user_id(), key).with_created_at(OffsetDateTime::now_utc());
        if !self.require_confirmation {
            user = user.with_email_confirmed_at(OffsetDateTime::now_utc());
        }
        self.insert_account(user.clone(), password);

        if self.require_confirmation {
            return Ok(SignUpOutcome::PendingConfirmation(user));
        }
        let mut state = self.state.lock();
        Ok(SignUpOutcome::Active(self.issue(&mut state, user)))
    }

    fn do_sign_in(&self, email: &Email, password: &str) -> Result<Session, Error> {
        self.begin("sign in")?;
        let mut state = self.state.lock();
        let account = state
            .accounts
            .get(&email.as_str().to_lowercase())
            .ok_or(Error::InvalidCredentials)?;
        if digest_password(&account.salt, password) != account.password_digest {
            return Err(Error::InvalidCredentials);
        }
        if !account.user.is_confirmed() {
            return Err(Error::provider("sign in", Some(400), "Email not confirmed"));
        }
        let user = account.user.clone();
        Ok(self.issue(&mut state, user))
    }

    fn do_refresh(&self, refresh_token: &str) -> Result<Session, Error> {
        self.begin("token refresh")?;
        let mut state = self.state.lock();
        let now = OffsetDateTime::now_utc();

        if let Some(user_id) = state.refresh_tokens.remove(refresh_token) {
            let user = state
                .account_by_id(&user_id)
                .map(|a| a.user.clone())
                .ok_or(Error::Unauthenticated)?;
            let session = self.issue(&mut state, user);
            state
                .rotated
                .insert(refresh_token.to_string(), (session.refresh_token.clone(), now));
            return Ok(session);
        }

        let successor = match state.rotated.get(refresh_token) {
            Some((successor, spent_at)) if now - *spent_at < self.reuse_interval => successor.clone(),
            _ => return Err(Error::Unauthenticated),
        };
        let user_id = state
            .refresh_tokens
            .get(&successor)
            .cloned()
            .ok_or(Error::Unauthenticated)?;
        let user = state
            .account_by_id(&user_id)
            .map(|a| a.user.clone())
            .ok_or(Error::Unauthenticated)?;
        Ok(self.issue_with(&mut state, user, successor))
    }

    fn do_get_user(&self, access_token: &str) -> Result<User, Error> {
        self.begin("get user")?;
        let mut state = self.state.lock();
        Self::authorize(&mut state, access_token).map(|a| a.user.clone())
    }

    fn do_update_user(&self, access_token: &str, attributes: &UserAttributes) -> Result<User, Error> {
        self.begin("update user")?;
        let mut state = self.state.lock();
        let account = Self::authorize(&mut state, access_token)?;
        if let Some(password) = &attributes.password {
            account.password_digest = digest_password(&account.salt, password);
        }
        if let Some(data) = &attributes.data {
            account
                .user
                .user_metadata
                .extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let user = account.user.clone();
        if let Some(email) = &attributes.email {
            let email = email.to_lowercase();
            let mut account = state
                .accounts
                .remove(&user.email)
                .ok_or(Error::Unauthenticated)?;
            account.user.email = email.clone();
            let user = account.user.clone();
            state.accounts.insert(email, account);
            return Ok(user);
        }
        Ok(user)
    }

    fn do_sign_out(&self, access_token: &str) -> Result<(), Error> {
        self.begin("sign out")?;
        let mut state = self.state.lock();
        let grant = state.grants.remove(access_token).ok_or(Error::Unauthenticated)?;
        state.refresh_tokens.remove(&grant.refresh_token);
        Ok(())
    }
}

impl IdentityProvider for InMemoryProvider {
    fn sign_up(
        &self,
        email: &Email,
        password: &str,
        _redirect_to: Option<&str>,
    ) -> impl Future<Output = Result<SignUpOutcome, Error>> + Send {
        ready(self.do_sign_up(email, password))
    }

    fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> impl Future<Output = Result<Session, Error>> + Send {
        ready(self.do_sign_in(email, password))
    }

    fn refresh(&self, refresh_token: &str) -> impl Future<Output = Result<Session, Error>> + Send {
        ready(self.do_refresh(refresh_token))
    }

    fn get_user(&self, access_token: &str) -> impl Future<Output = Result<User, Error>> + Send {
        ready(self.do_get_user(access_token))
    }

    fn update_user(
        &self,
        access_token: &str,
        attributes: &UserAttributes,
    ) -> impl Future<Output = Result<User, Error>> + Send {
        ready(self.do_update_user(access_token, attributes))
    }

    fn sign_out(&self, access_token: &str) -> impl Future<Output = Result<(), Error>> + Send {
        ready(self.do_sign_out(access_token))
    }
}

/// 32 random bytes, base64url without padding.
fn generate_token() -> String {
    let random_bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// UUID-shaped random identifier.
fn generate_user_id() -> String {
    let n: u128 = rand::rng().random();
    let hex = format!("{n:032x}");
    format!(
        "{}-{}-{}-{}-{}",
        &hex[..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..]
    )
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
