//! Login state machine.

use crate::error::{AuthError, Result};
use crate::mfa::{detect_mfa, MfaCodeProvider, MfaKind, TotpProvider};
use std::fmt;
use std::sync::Arc;
use trucktech_browser::{BrowserError, BrowserLauncher, PageDriver, SessionStore};
use trucktech_core::{AppConfig, AuthConfig, Credentials, PortalConfig, SelectorConfig};

/// Where the authenticator is in the login flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Nothing tried yet, or a saved session was rejected
    NoSession,
    /// Checking whether a saved session still works
    SessionProbing,
    /// Sign-in form submitted, waiting for the portal's answer
    FreshLoginInProgress,
    /// The portal asked for a second factor
    MfaPending(MfaKind),
    /// Signed in
    Authenticated,
    /// The last attempt failed
    LoginFailed,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSession => f.write_str("no session"),
            Self::SessionProbing => f.write_str("probing session"),
            Self::FreshLoginInProgress => f.write_str("fresh login"),
            Self::MfaPending(kind) => write!(f, "MFA pending ({kind})"),
            Self::Authenticated => f.write_str("authenticated"),
            Self::LoginFailed => f.write_str("login failed"),
        }
    }
}

/// How a successful login came about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The saved session was still valid
    SessionReused,
    /// Username and password were accepted
    FreshLogin,
    /// A second factor was answered
    MfaCompleted(MfaKind),
    /// The portal landed somewhere unrecognised that is not the login page
    Tentative {
        /// Where the browser ended up
        url: String,
    },
}

/// Drives the portal login.
///
/// Owns the browser for its whole life: call [`Authenticator::into_session`]
/// after a successful [`Authenticator::login`] to keep using the page, or
/// [`Authenticator::close`] to release everything.
pub struct Authenticator {
    launcher: Arc<dyn BrowserLauncher>,
    store: Arc<dyn SessionStore>,
    portal: PortalConfig,
    auth: AuthConfig,
    selectors: SelectorConfig,
    credentials: Credentials,
    mfa_provider: Option<Arc<dyn MfaCodeProvider>>,
    state: AuthState,
    page: Option<Box<dyn PageDriver>>,
}

impl Authenticator {
    /// Create an authenticator.
    ///
    /// When the credentials carry a TOTP secret a [`TotpProvider`] is set up
    /// for authenticator-app challenges.
    pub fn new(
        config: &AppConfig,
        credentials: Credentials,
        launcher: Arc<dyn BrowserLauncher>,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        let mfa_provider = match credentials.totp_secret() {
            Some(secret) => Some(Arc::new(TotpProvider::new(secret)?) as Arc<dyn MfaCodeProvider>),
            None => None,
        };

        Ok(Self {
            launcher,
            store,
            portal: config.portal.clone(),
            auth: config.auth.clone(),
            selectors: config.selectors.clone(),
            credentials,
            mfa_provider,
            state: AuthState::NoSession,
            page: None,
        })
    }

    /// Answer authenticator-app challenges with `provider`.
    #[must_use]
    pub fn with_mfa_provider(mut self, provider: Arc<dyn MfaCodeProvider>) -> Self {
        self.mfa_provider = Some(provider);
        self
    }

    /// Current state
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Whether a signed-in page is held
    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated && self.page.is_some()
    }

    fn transition(&mut self, next: AuthState) {
        if self.state != next {
            tracing::debug!("Auth state: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    /// Sign in, reusing the saved session when the portal still accepts it.
    ///
    /// `Ok` always means the held page is signed in.
    pub async fn login(&mut self) -> Result<LoginOutcome> {
        self.release_page().await;
        self.transition(AuthState::NoSession);

        tracing::info!("Checking existing session...");
        if self.probe_session().await {
            self.transition(AuthState::Authenticated);
            return Ok(LoginOutcome::SessionReused);
        }

        tracing::info!("Logging in to {}...", self.portal.base_url);
        match self.fresh_login().await {
            Ok(outcome) => {
                self.transition(AuthState::Authenticated);
                Ok(outcome)
            }
            Err(e) => {
                self.transition(AuthState::LoginFailed);
                Err(e)
            }
        }
    }

    /// Try the saved session. Any failure means "no valid session".
    async fn probe_session(&mut self) -> bool {
        let saved = match self.store.load(&self.auth.session_file).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                tracing::debug!("No saved session at {}", self.auth.session_file.display());
                return false;
            }
            Err(e) => {
                tracing::warn!("Session load failed: {}", e);
                return false;
            }
        };

        self.transition(AuthState::SessionProbing);
        let page = match self.launcher.open_page(Some(&saved)).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Session load failed: {}", e);
                self.transition(AuthState::NoSession);
                return false;
            }
        };

        match self.session_accepted(page.as_ref()).await {
            Ok(true) => {
                tracing::info!("Reused existing session");
                self.page = Some(page);
                return true;
            }
            Ok(false) => tracing::info!("Saved session expired, logging in again"),
            Err(e) => tracing::warn!("Session load failed: {}", e),
        }

        if let Err(e) = page.close().await {
            tracing::debug!("Closing probe page failed: {}", e);
        }
        self.transition(AuthState::NoSession);
        false
    }

    async fn session_accepted(&self, page: &dyn PageDriver) -> std::result::Result<bool, BrowserError> {
        page.navigate(&self.portal.dashboard_url()).await?;
        page.wait_for_load_settled(self.auth.session_probe_timeout()).await?;
        let url = page.current_url().await?;
        Ok(!self.portal.is_login_url(&url))
    }

    async fn fresh_login(&mut self) -> Result<LoginOutcome> {
        self.transition(AuthState::FreshLoginInProgress);
        let page = self
            .launcher
            .open_page(None)
            .await
            .map_err(AuthError::login_failed)?;

        let result = self.submit_login(page.as_ref()).await;
        // Held even on failure so close() releases it
        self.page = Some(page);
        result
    }

    async fn submit_login(&mut self, page: &dyn PageDriver) -> Result<LoginOutcome> {
        let login_url = self.portal.login_url();
        tracing::debug!("Navigating to {}", login_url);
        page.navigate(&login_url).await.map_err(AuthError::login_failed)?;
        page.wait_for_load_settled(self.auth.login_page_timeout())
            .await
            .map_err(AuthError::login_failed)?;

        tracing::debug!("Entering credentials for {}", self.credentials.username);
        page.fill(&self.selectors.login_username, &self.credentials.username)
            .await
            .map_err(AuthError::login_failed)?;
        page.fill(&self.selectors.login_password, self.credentials.password())
            .await
            .map_err(AuthError::login_failed)?;
        page.click(&self.selectors.login_submit)
            .await
            .map_err(AuthError::login_failed)?;
        page.wait_for_load_settled(self.auth.login_settle_timeout())
            .await
            .map_err(AuthError::login_failed)?;

        let mut outcome = LoginOutcome::FreshLogin;
        if let Some(kind) = detect_mfa(page).await {
            self.transition(AuthState::MfaPending(kind));
            self.handle_mfa(page, kind).await?;
            outcome = LoginOutcome::MfaCompleted(kind);
        }

        let url = page.current_url().await.map_err(AuthError::login_failed)?;
        if self.portal.is_authenticated_url(&url) {
            tracing::info!("Login successful");
            self.persist(page).await;
            return Ok(outcome);
        }

        if let Some(banner) = page
            .query_selector(&self.selectors.login_error)
            .await
            .map_err(AuthError::login_failed)?
        {
            let text = banner.text().await.map_err(AuthError::login_failed)?;
            return Err(AuthError::LoginFailed(text.trim().to_string()));
        }

        if self.portal.is_login_url(&url) {
            return Err(AuthError::LoginFailed("still on login page".to_string()));
        }

        // Not the login page and not a known landing page; the portal has
        // interposed notices here before.
        tracing::warn!("Unexpected URL after login: {}; assuming success", url);
        self.persist(page).await;
        Ok(LoginOutcome::Tentative { url })
    }

    async fn handle_mfa(&self, page: &dyn PageDriver, kind: MfaKind) -> Result<()> {
        tracing::info!("MFA detected: {}", kind);

        if kind == MfaKind::Totp {
            if let Some(provider) = &self.mfa_provider {
                let input = page
                    .query_selector(&self.selectors.mfa_code_input)
                    .await
                    .map_err(AuthError::login_failed)?;
                if let Some(input) = input {
                    let code = provider.current_code().await?;
                    tracing::info!("Entering TOTP code...");
                    input.fill(&code).await.map_err(AuthError::login_failed)?;
                    page.click(&self.selectors.mfa_submit)
                        .await
                        .map_err(AuthError::login_failed)?;

                    return match page
                        .wait_for_url(&self.portal.dashboard_path, self.auth.mfa_timeout())
                        .await
                    {
                        Ok(_) => Ok(()),
                        Err(e) => {
                            tracing::warn!("TOTP code rejected: {}", e);
                            Err(AuthError::LoginFailed("MFA verification failed".to_string()))
                        }
                    };
                }
                tracing::warn!("No MFA code input found");
            }
        }

        if self.launcher.is_interactive() {
            let timeout = self.auth.interactive_mfa_timeout();
            tracing::info!("Complete MFA manually in the browser ({:?} timeout)...", timeout);
            return match page.wait_for_url(&self.portal.dashboard_path, timeout).await {
                Ok(_) => {
                    self.persist(page).await;
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!("Manual MFA not completed: {}", e);
                    Err(AuthError::LoginFailed("MFA verification failed".to_string()))
                }
            };
        }

        Err(AuthError::MfaRequired { kind })
    }

    /// Save the page's session. Failures are logged; the login still stands.
    async fn persist(&self, page: &dyn PageDriver) {
        let path = &self.auth.session_file;
        let state = match page.session_state().await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("Could not read session state: {}", e);
                return;
            }
        };
        match self.store.save(path, &state).await {
            Ok(()) => tracing::info!("Session saved for reuse"),
            Err(e) => tracing::warn!("Could not save session to {}: {}", path.display(), e),
        }
    }

    async fn release_page(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                tracing::debug!("Closing page failed: {}", e);
            }
        }
    }

    /// Hand the signed-in page over to the caller.
    ///
    /// Without a signed-in page the browser is shut down and
    /// [`AuthError::NotAuthenticated`] returned.
    pub async fn into_session(mut self) -> Result<PortalSession> {
        match self.page.take() {
            Some(page) if self.state == AuthState::Authenticated => Ok(PortalSession {
                page,
                launcher: self.launcher,
                portal: self.portal,
            }),
            page => {
                self.page = page;
                self.close().await?;
                Err(AuthError::NotAuthenticated)
            }
        }
    }

    /// Close the page and shut the browser down.
    pub async fn close(mut self) -> Result<()> {
        self.release_page().await;
        self.launcher.shutdown().await?;
        Ok(())
    }
}

/// A signed-in portal page.
///
/// Release it with [`PortalSession::close`]; the browser process is also
/// killed if the launcher is dropped.
pub struct PortalSession {
    page: Box<dyn PageDriver>,
    launcher: Arc<dyn BrowserLauncher>,
    portal: PortalConfig,
}

impl PortalSession {
    /// Assemble a session around an already signed-in page.
    pub fn new(
        page: Box<dyn PageDriver>,
        launcher: Arc<dyn BrowserLauncher>,
        portal: PortalConfig,
    ) -> Self {
        Self {
            page,
            launcher,
            portal,
        }
    }

    /// The signed-in page
    pub fn page(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    /// Portal locations
    pub fn portal(&self) -> &PortalConfig {
        &self.portal
    }

    /// Close the page, then shut the browser down. Both are attempted.
    pub async fn close(self) -> std::result::Result<(), BrowserError> {
        let closed = self.page.close().await;
        let shutdown = self.launcher.shutdown().await;
        tracing::debug!("Portal session closed");
        closed.and(shutdown)
    }
}
