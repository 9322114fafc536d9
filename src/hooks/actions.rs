use std::sync::Arc;

use tokio::sync::watch;

use super::navigation::Navigator;
use super::state::{HookState, Reactive};
use crate::channel::CredentialChannel;
use crate::error::Error;
use crate::types::{Session, SignUpOutcome};

pub const AUTHENTICATED_LANDING: &str = "/dashboard";
pub const UNAUTHENTICATED_LANDING: &str = "/";

/// Account creation with observable progress.
pub struct SignUp<C> {
    channel: Arc<C>,
    state: Reactive<HookState<SignUpOutcome>>,
}

impl<C: CredentialChannel> SignUp<C> {
    #[must_use]
    pub fn new(channel: Arc<C>) -> Self {
        Self {
            channel,
            state: Reactive::new(HookState::Idle),
        }
    }

    /// # Errors
    ///
    /// Whatever the channel reports; the same error is kept in the state.
    pub async fn execute(
        &self,
        email: &str,
        password: &str,
        redirect_to: Option<&str>,
    ) -> Result<SignUpOutcome, Arc<Error>> {
        self.state
            .track(self.channel.sign_up(email, password, redirect_to))
            .await
    }

    #[must_use]
    pub fn state(&self) -> HookState<SignUpOutcome> {
        self.state.get()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<HookState<SignUpOutcome>> {
        self.state.watch()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    #[must_use]
    pub fn error(&self) -> Option<Arc<Error>> {
        self.state.error()
    }

    pub fn deactivate(&self) {
        self.state.deactivate();
    }
}

/// Password sign-in that moves the user on once the session is committed.
pub struct SignIn<C, N> {
    channel: Arc<C>,
    navigator: N,
    landing: String,
    state: Reactive<HookState<Session>>,
}

impl<C: CredentialChannel, N: Navigator> SignIn<C, N> {
    #[must_use]
    pub fn new(channel: Arc<C>, navigator: N) -> Self {
        Self {
            channel,
            navigator,
            landing: AUTHENTICATED_LANDING.to_string(),
            state: Reactive::new(HookState::Idle),
        }
    }

    #[must_use]
    pub fn with_landing(mut self, path: impl Into<String>) -> Self {
        self.landing = path.into();
        self
    }

    /// Navigates only when the sign-in succeeds.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCredentials`] for a rejected pair, otherwise whatever
    /// the channel reports.
    pub async fn execute(&self, email: &str, password: &str) -> Result<Session, Arc<Error>> {
        let session = self
            .state
            .track(self.channel.sign_in_with_password(email, password))
            .await?;
        if self.state.is_active() {
            self.navigator.navigate(&self.landing);
        }
        Ok(session)
    }

    #[must_use]
    pub fn state(&self) -> HookState<Session> {
        self.state.get()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<HookState<Session>> {
        self.state.watch()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    #[must_use]
    pub fn error(&self) -> Option<Arc<Error>> {
        self.state.error()
    }

    pub fn deactivate(&self) {
        self.state.deactivate();
    }
}

/// Sign-out that sends the user to the public landing page once done.
pub struct SignOut<C, N> {
    channel: Arc<C>,
    navigator: N,
    landing: String,
    state: Reactive<HookState<()>>,
}

impl<C: CredentialChannel, N: Navigator> SignOut<C, N> {
    #[must_use]
    pub fn new(channel: Arc<C>, navigator: N) -> Self {
        Self {
            channel,
            navigator,
            landing: UNAUTHENTICATED_LANDING.to_string(),
            state: Reactive::new(HookState::Idle),
        }
    }

    #[must_use]
    pub fn with_landing(mut self, path: impl Into<String>) -> Self {
        self.landing = path.into();
        self
    }

    /// # Errors
    ///
    /// Provider failures; the local session is kept in that case.
    pub async fn execute(&self) -> Result<(), Arc<Error>> {
        self.state.track(self.channel.sign_out()).await?;
        if self.state.is_active() {
            self.navigator.navigate(&self.landing);
        }
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> HookState<()> {
        self.state.get()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<HookState<()>> {
        self.state.watch()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    #[must_use]
    pub fn error(&self) -> Option<Arc<Error>> {
        self.state.error()
    }

    pub fn deactivate(&self) {
        self.state.deactivate();
    }
}
