//! Scripted in-memory portal.
//!
//! [`FakePortal`] serves canned HTML per path, redirects protected pages to
//! the sign-in form until a login succeeds, and reacts to form submission the
//! way the real portal does. Element handles re-parse the page they came from
//! on every query, so nothing non-`Send` is held across an await.

use crate::fixtures;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use trucktech_browser::{
    BrowserError, BrowserLauncher, PageDriver, PageElement, Result, SessionState, StoredCookie,
};
use trucktech_core::SelectorConfig;

/// Name of the session cookie the fake portal issues.
pub const SESSION_COOKIE: &str = "_decisiv_session";

const LOGIN_PATH: &str = "/login";
const MFA_PATH: &str = "/login/mfa";
const DASHBOARD_PATH: &str = "/dashboard";

/// Second factor the fake portal demands after a correct password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MfaChallenge {
    /// Authenticator app; the expected code
    Totp(String),
    /// Text message; cannot be answered automatically
    Sms,
    /// E-mail; cannot be answered automatically
    Email,
}

impl MfaChallenge {
    fn page(&self) -> String {
        match self {
            Self::Totp(_) => fixtures::totp_challenge_page(),
            Self::Sms => fixtures::sms_challenge_page(),
            Self::Email => fixtures::email_challenge_page(),
        }
    }
}

/// What happens when wrong credentials are submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Sign-in form again, with an error banner
    Banner(String),
    /// Sign-in form again, no banner
    Silent,
}

#[derive(Debug, Clone)]
struct Route {
    html: String,
    protected: bool,
}

#[derive(Debug, Clone)]
struct LoginScript {
    username: String,
    password: String,
    mfa: Option<MfaChallenge>,
    rejection: Rejection,
    landing_path: String,
}

#[derive(Debug, Default)]
struct PortalState {
    url: String,
    html: Arc<str>,
    authenticated: bool,
    session_token: u32,
    fills: Vec<(String, String)>,
    clicks: Vec<String>,
    navigations: Vec<String>,
    pages_opened: usize,
    pages_closed: usize,
    shut_down: bool,
}

#[derive(Debug)]
struct PortalInner {
    base_url: String,
    selectors: SelectorConfig,
    routes: Mutex<HashMap<String, Route>>,
    failing: Mutex<HashMap<String, String>>,
    stalled: Mutex<HashSet<String>>,
    expire_on: Mutex<HashSet<String>>,
    login: Mutex<Option<LoginScript>>,
    restore_error: Mutex<Option<String>>,
    interactive: Mutex<bool>,
    state: Mutex<PortalState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// A scripted portal. Clones share state.
#[derive(Debug, Clone)]
pub struct FakePortal {
    inner: Arc<PortalInner>,
}

impl FakePortal {
    /// Empty portal at `base_url`, headless, using the default selectors.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: Arc::new(PortalInner {
                base_url: base_url.trim_end_matches('/').to_string(),
                selectors: SelectorConfig::default(),
                routes: Mutex::new(HashMap::new()),
                failing: Mutex::new(HashMap::new()),
                stalled: Mutex::new(HashSet::new()),
                expire_on: Mutex::new(HashSet::new()),
                login: Mutex::new(None),
                restore_error: Mutex::new(None),
                interactive: Mutex::new(false),
                state: Mutex::new(PortalState {
                    url: "about:blank".to_string(),
                    session_token: 1,
                    ..PortalState::default()
                }),
            }),
        }
    }

    /// Serve `html` at `path` to anyone.
    #[must_use]
    pub fn page(self, path: &str, html: &str) -> Self {
        self.route(path, html, false)
    }

    /// Serve `html` at `path` once signed in; redirect to the sign-in form otherwise.
    #[must_use]
    pub fn protected_page(self, path: &str, html: &str) -> Self {
        self.route(path, html, true)
    }

    fn route(self, path: &str, html: &str, protected: bool) -> Self {
        lock(&self.inner.routes).insert(
            path.to_string(),
            Route {
                html: html.to_string(),
                protected,
            },
        );
        self
    }

    /// Accept `username`/`password` on the sign-in form.
    ///
    /// Also serves the sign-in form at `/login` and a protected dashboard.
    #[must_use]
    pub fn with_login(self, username: &str, password: &str) -> Self {
        *lock(&self.inner.login) = Some(LoginScript {
            username: username.to_string(),
            password: password.to_string(),
            mfa: None,
            rejection: Rejection::Banner("Invalid email or password".to_string()),
            landing_path: DASHBOARD_PATH.to_string(),
        });
        {
            let mut routes = lock(&self.inner.routes);
            routes.entry(LOGIN_PATH.to_string()).or_insert(Route {
                html: fixtures::login_page(),
                protected: false,
            });
            routes.entry(DASHBOARD_PATH.to_string()).or_insert(Route {
                html: fixtures::dashboard_page(),
                protected: true,
            });
        }
        self
    }

    fn edit_login(self, edit: impl FnOnce(&mut LoginScript)) -> Self {
        if let Some(script) = lock(&self.inner.login).as_mut() {
            edit(script);
        }
        self
    }

    /// Demand a second factor after a correct password.
    #[must_use]
    pub fn with_mfa(self, challenge: MfaChallenge) -> Self {
        self.edit_login(|s| s.mfa = Some(challenge))
    }

    /// How wrong credentials are answered.
    #[must_use]
    pub fn with_rejection(self, rejection: Rejection) -> Self {
        self.edit_login(|s| s.rejection = rejection)
    }

    /// Where a successful login lands instead of the dashboard.
    #[must_use]
    pub fn landing_at(self, path: &str) -> Self {
        self.edit_login(|s| s.landing_path = path.to_string())
    }

    /// Make navigation to `path` fail outright.
    #[must_use]
    pub fn failing_page(self, path: &str, message: &str) -> Self {
        lock(&self.inner.failing).insert(path.to_string(), message.to_string());
        self
    }

    /// Make the page at `path` never finish loading.
    #[must_use]
    pub fn stalled_page(self, path: &str) -> Self {
        lock(&self.inner.stalled).insert(path.to_string());
        self
    }

    /// Invalidate the session when `path` is requested.
    #[must_use]
    pub fn expire_session_on(self, path: &str) -> Self {
        lock(&self.inner.expire_on).insert(path.to_string());
        self
    }

    /// Fail to restore any saved session with `message`.
    #[must_use]
    pub fn failing_restore(self, message: &str) -> Self {
        *lock(&self.inner.restore_error) = Some(message.to_string());
        self
    }

    /// Pretend a human can see the browser window.
    #[must_use]
    pub fn interactive(self) -> Self {
        *lock(&self.inner.interactive) = true;
        self
    }

    /// Absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    /// A session the portal currently accepts.
    pub fn valid_session(&self) -> SessionState {
        let token = lock(&self.inner.state).session_token;
        self.session_with_token(token)
    }

    /// Invalidate every issued session and sign the current page out.
    pub fn expire_sessions(&self) {
        let mut state = lock(&self.inner.state);
        state.session_token += 1;
        state.authenticated = false;
    }

    /// Finish a pending challenge as a human at the keyboard would.
    pub fn complete_mfa_by_hand(&self) {
        let mut state = lock(&self.inner.state);
        if path_of(&self.inner.base_url, &state.url) == MFA_PATH {
            state.authenticated = true;
            drop(state);
            self.inner.load(DASHBOARD_PATH);
        }
    }

    /// Whether the current page is signed in.
    pub fn is_authenticated(&self) -> bool {
        lock(&self.inner.state).authenticated
    }

    /// Every `(selector, value)` filled so far.
    pub fn fills(&self) -> Vec<(String, String)> {
        lock(&self.inner.state).fills.clone()
    }

    /// Selectors of every clicked element.
    pub fn clicks(&self) -> Vec<String> {
        lock(&self.inner.state).clicks.clone()
    }

    /// Every URL navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        lock(&self.inner.state).navigations.clone()
    }

    /// Whether any value was typed into the username field.
    pub fn credentials_entered(&self) -> bool {
        let selector = &self.inner.selectors.login_username;
        lock(&self.inner.state)
            .fills
            .iter()
            .any(|(s, _)| s == selector)
    }

    /// Pages opened so far.
    pub fn pages_opened(&self) -> usize {
        lock(&self.inner.state).pages_opened
    }

    /// Pages closed so far.
    pub fn pages_closed(&self) -> usize {
        lock(&self.inner.state).pages_closed
    }

    /// Whether [`BrowserLauncher::shutdown`] was called.
    pub fn was_shut_down(&self) -> bool {
        lock(&self.inner.state).shut_down
    }

    fn session_with_token(&self, token: u32) -> SessionState {
        let domain = url_host(&self.inner.base_url);
        SessionState {
            cookies: vec![StoredCookie {
                name: SESSION_COOKIE.to_string(),
                value: format!("token-{token}"),
                domain,
                path: "/".to_string(),
                expires: None,
                http_only: true,
                secure: true,
            }],
            origins: Vec::new(),
            saved_at: None,
        }
    }
}

fn url_host(base_url: &str) -> String {
    base_url
        .split("://")
        .nth(1)
        .unwrap_or(base_url)
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Path part of `url` relative to `base_url`, without query or fragment.
fn path_of(base_url: &str, url: &str) -> String {
    let rest = url.strip_prefix(base_url).unwrap_or(url);
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    let path = &rest[..end];
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

impl PortalInner {
    fn current_path(&self) -> String {
        let state = lock(&self.state);
        path_of(&self.base_url, &state.url)
    }

    /// Render `path` into the current page, applying access rules.
    fn load(&self, path: &str) {
        let route = lock(&self.routes).get(path).cloned();
        let mut state = lock(&self.state);
        match route {
            Some(route) if route.protected && !state.authenticated => {
                let login = lock(&self.routes)
                    .get(LOGIN_PATH)
                    .map_or_else(fixtures::login_page, |r| r.html.clone());
                state.url = format!("{}{LOGIN_PATH}?next={path}", self.base_url);
                state.html = Arc::from(login);
            }
            Some(route) => {
                state.url = format!("{}{path}", self.base_url);
                state.html = Arc::from(route.html);
            }
            None => {
                state.url = format!("{}{path}", self.base_url);
                state.html = Arc::from("<html><body><h1>Not Found</h1></body></html>");
            }
        }
    }

    fn show(&self, path: &str, html: String) {
        let mut state = lock(&self.state);
        state.url = format!("{}{path}", self.base_url);
        state.html = Arc::from(html);
    }

    fn last_fill(&self, selector: &str) -> Option<String> {
        lock(&self.state)
            .fills
            .iter()
            .rev()
            .find(|(s, _)| s == selector)
            .map(|(_, v)| v.clone())
    }

    fn submit(&self) {
        let Some(script) = lock(&self.login).clone() else {
            return;
        };

        match self.current_path().as_str() {
            LOGIN_PATH => {
                let username = self.last_fill(&self.selectors.login_username);
                let password = self.last_fill(&self.selectors.login_password);
                let accepted = username.as_deref() == Some(script.username.as_str())
                    && password.as_deref() == Some(script.password.as_str());

                if !accepted {
                    let html = match &script.rejection {
                        Rejection::Banner(message) => fixtures::login_page_with_error(message),
                        Rejection::Silent => fixtures::login_page(),
                    };
                    self.show(LOGIN_PATH, html);
                } else if let Some(challenge) = &script.mfa {
                    self.show(MFA_PATH, challenge.page());
                } else {
                    lock(&self.state).authenticated = true;
                    self.load(&script.landing_path);
                }
            }
            MFA_PATH => {
                let expected = match &script.mfa {
                    Some(MfaChallenge::Totp(code)) => Some(code.clone()),
                    _ => None,
                };
                let entered = self.last_fill(&self.selectors.mfa_code_input);
                if expected.is_some() && entered == expected {
                    lock(&self.state).authenticated = true;
                    self.load(DASHBOARD_PATH);
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakePortal {
    async fn open_page(&self, session: Option<&SessionState>) -> Result<Box<dyn PageDriver>> {
        if session.is_some() {
            if let Some(message) = lock(&self.inner.restore_error).clone() {
                return Err(BrowserError::Session(message));
            }
        }

        let mut state = lock(&self.inner.state);
        let valid = format!("token-{}", state.session_token);
        state.authenticated = session
            .and_then(|s| s.cookie(SESSION_COOKIE))
            .is_some_and(|c| c.value == valid);
        state.url = "about:blank".to_string();
        state.html = Arc::from("");
        state.pages_opened += 1;

        Ok(Box::new(FakePage {
            portal: self.clone(),
        }))
    }

    fn is_interactive(&self) -> bool {
        *lock(&self.inner.interactive)
    }

    async fn shutdown(&self) -> Result<()> {
        lock(&self.inner.state).shut_down = true;
        Ok(())
    }
}

/// A page on the fake portal.
pub struct FakePage {
    portal: FakePortal,
}

impl FakePage {
    fn snapshot(&self) -> Arc<str> {
        lock(&self.portal.inner.state).html.clone()
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| BrowserError::Chromium(format!("invalid selector '{selector}': {e}")))
}

/// Position of `element` among all elements of `doc`, in document order.
fn element_index(doc: &Html, element: &ElementRef<'_>) -> usize {
    all_elements(doc)
        .position(|e| e.id() == element.id())
        .unwrap_or_default()
}

fn all_elements(doc: &Html) -> impl Iterator<Item = ElementRef<'_>> {
    doc.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
}

/// Text nodes joined by single spaces, roughly what `innerText` yields.
fn rendered_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn select_handles(
    portal: &FakePortal,
    html: &Arc<str>,
    scope: Option<usize>,
    selector: &str,
) -> Result<Vec<FakeElement>> {
    let parsed = parse_selector(selector)?;
    let doc = Html::parse_document(html);
    let indices: Vec<usize> = match scope {
        None => doc
            .select(&parsed)
            .map(|e| element_index(&doc, &e))
            .collect(),
        Some(index) => match all_elements(&doc).nth(index) {
            Some(parent) => parent
                .select(&parsed)
                .filter(|e| e.id() != parent.id())
                .map(|e| element_index(&doc, &e))
                .collect(),
            None => Vec::new(),
        },
    };

    Ok(indices
        .into_iter()
        .map(|index| FakeElement {
            portal: portal.clone(),
            html: html.clone(),
            index,
            selector: selector.to_string(),
        })
        .collect())
}

fn boxed(elements: Vec<FakeElement>) -> Vec<Box<dyn PageElement>> {
    elements
        .into_iter()
        .map(|e| Box::new(e) as Box<dyn PageElement>)
        .collect()
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let inner = &self.portal.inner;
        lock(&inner.state).navigations.push(url.to_string());

        let path = path_of(&inner.base_url, url);
        if let Some(message) = lock(&inner.failing).get(&path).cloned() {
            return Err(BrowserError::Navigation(format!("{url}: {message}")));
        }
        if lock(&inner.expire_on).contains(&path) {
            self.portal.expire_sessions();
        }

        inner.load(&path);
        Ok(())
    }

    async fn wait_for_load_settled(&self, timeout: Duration) -> Result<()> {
        let path = self.portal.inner.current_path();
        let stalled = lock(&self.portal.inner.stalled).contains(&path);
        if stalled {
            tokio_sleep(timeout).await;
            return Err(BrowserError::Timeout(format!(
                "page did not settle within {timeout:?}"
            )));
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(lock(&self.portal.inner.state).url.clone())
    }

    async fn query_selector(&self, selector: &str) -> Result<Option<Box<dyn PageElement>>> {
        let html = self.snapshot();
        let first = select_handles(&self.portal, &html, None, selector)?
            .into_iter()
            .next();
        Ok(first.map(|e| Box::new(e) as Box<dyn PageElement>))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn PageElement>>> {
        let html = self.snapshot();
        Ok(boxed(select_handles(&self.portal, &html, None, selector)?))
    }

    async fn has_exact_text(&self, text: &str) -> Result<bool> {
        let html = self.snapshot();
        let doc = Html::parse_document(&html);
        let found = all_elements(&doc).any(|e| rendered_text(&e) == text);
        Ok(found)
    }

    async fn session_state(&self) -> Result<SessionState> {
        let (authenticated, token) = {
            let state = lock(&self.portal.inner.state);
            (state.authenticated, state.session_token)
        };
        if authenticated {
            Ok(self.portal.session_with_token(token))
        } else {
            Ok(SessionState::default())
        }
    }

    async fn close(&self) -> Result<()> {
        lock(&self.portal.inner.state).pages_closed += 1;
        Ok(())
    }
}

async fn tokio_sleep(duration: Duration) {
    // Bounded so tests with production timeouts stay fast.
    tokio::time::sleep(duration.min(Duration::from_millis(50))).await;
}

/// An element on a [`FakePage`], addressed by its document position.
pub struct FakeElement {
    portal: FakePortal,
    html: Arc<str>,
    index: usize,
    selector: String,
}

impl FakeElement {
    fn with_element<T>(&self, f: impl FnOnce(&ElementRef<'_>) -> T) -> Result<T> {
        let doc = Html::parse_document(&self.html);
        let element = all_elements(&doc)
            .nth(self.index)
            .ok_or_else(|| BrowserError::SelectorNotFound(self.selector.clone()))?;
        Ok(f(&element))
    }
}

#[async_trait]
impl PageElement for FakeElement {
    async fn text(&self) -> Result<String> {
        self.with_element(rendered_text)
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.with_element(|e| e.value().attr(name).map(str::to_string))
    }

    async fn fill(&self, value: &str) -> Result<()> {
        lock(&self.portal.inner.state)
            .fills
            .push((self.selector.clone(), value.to_string()));
        Ok(())
    }

    async fn click(&self) -> Result<()> {
        lock(&self.portal.inner.state)
            .clicks
            .push(self.selector.clone());
        self.portal.inner.submit();
        Ok(())
    }

    async fn query_selector(&self, selector: &str) -> Result<Option<Box<dyn PageElement>>> {
        let first = select_handles(&self.portal, &self.html, Some(self.index), selector)?
            .into_iter()
            .next();
        Ok(first.map(|e| Box::new(e) as Box<dyn PageElement>))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn PageElement>>> {
        Ok(boxed(select_handles(
            &self.portal,
            &self.html,
            Some(self.index),
            selector,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;

    #[test]
    fn test_path_of() {
        assert_eq!(path_of(BASE_URL, "https://portal.test/login?next=/assets"), "/login");
        assert_eq!(path_of(BASE_URL, "https://portal.test"), "/");
        assert_eq!(path_of(BASE_URL, "https://portal.test/assets#top"), "/assets");
    }

    #[tokio::test]
    async fn test_protected_page_redirects_to_login() {
        let portal = FakePortal::new(BASE_URL)
            .with_login("user", "pass")
            .protected_page("/assets", &empty_roster_page());
        let page = portal.open_page(None).await.unwrap();

        page.navigate(&portal.url("/assets")).await.unwrap();
        let url = page.current_url().await.unwrap();
        assert!(url.starts_with("https://portal.test/login"));
        assert!(page.query_selector("#auth_key").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_login_script() {
        let portal = FakePortal::new(BASE_URL).with_login("user", "pass");
        let page = portal.open_page(None).await.unwrap();
        let selectors = SelectorConfig::default();

        page.navigate(&portal.url("/login")).await.unwrap();
        page.fill(&selectors.login_username, "user").await.unwrap();
        page.fill(&selectors.login_password, "wrong").await.unwrap();
        page.click(&selectors.login_submit).await.unwrap();
        assert!(page.query_selector(".alert-danger").await.unwrap().is_some());
        assert!(!portal.is_authenticated());

        page.fill(&selectors.login_password, "pass").await.unwrap();
        page.click(&selectors.login_submit).await.unwrap();
        assert_eq!(page.current_url().await.unwrap(), "https://portal.test/dashboard");
        assert!(portal.is_authenticated());
        assert!(portal.credentials_entered());
    }

    #[tokio::test]
    async fn test_session_restore() {
        let portal = FakePortal::new(BASE_URL)
            .with_login("user", "pass")
            .protected_page("/assets", &empty_roster_page());

        let saved = portal.valid_session();
        let page = portal.open_page(Some(&saved)).await.unwrap();
        page.navigate(&portal.url("/assets")).await.unwrap();
        assert_eq!(page.current_url().await.unwrap(), "https://portal.test/assets");

        portal.expire_sessions();
        let page = portal.open_page(Some(&saved)).await.unwrap();
        page.navigate(&portal.url("/assets")).await.unwrap();
        assert!(page.current_url().await.unwrap().contains("/login"));
        assert_eq!(portal.pages_opened(), 2);
    }

    #[tokio::test]
    async fn test_nested_queries_and_text() {
        let rows = [sample_row(VIN_A), sample_row(VIN_B)];
        let portal = FakePortal::new(BASE_URL).page("/assets", &roster_table(&rows));
        let page = portal.open_page(None).await.unwrap();
        page.navigate(&portal.url("/assets")).await.unwrap();

        let trs = page.query_all("table tbody tr").await.unwrap();
        assert_eq!(trs.len(), 2);
        let cells = trs[1].query_all("td").await.unwrap();
        assert_eq!(cells.len(), 4);
        assert_eq!(cells[0].text().await.unwrap(), VIN_B);
        assert_eq!(cells[3].text().await.unwrap(), "Active");
        assert!(page.has_exact_text("Active").await.unwrap());
        assert!(!page.has_exact_text("Activ").await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_and_stalled_pages() {
        let portal = FakePortal::new(BASE_URL)
            .failing_page("/down", "net::ERR_CONNECTION_RESET")
            .stalled_page("/slow");
        let page = portal.open_page(None).await.unwrap();

        let err = page.navigate(&portal.url("/down")).await.unwrap_err();
        assert!(matches!(err, BrowserError::Navigation(_)));

        page.navigate(&portal.url("/slow")).await.unwrap();
        let err = page
            .wait_for_load_settled(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_invalid_selector_is_error() {
        let portal = FakePortal::new(BASE_URL).page("/", &blank_page());
        let page = portal.open_page(None).await.unwrap();
        page.navigate(&portal.url("/")).await.unwrap();
        assert!(page.query_selector("div[").await.is_err());
    }
}
