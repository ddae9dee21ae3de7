//! Authenticated Session Module
//!
//! Logs in to the portal and keeps the session alive:
//! - Anti-forgery token scraped from the login form
//! - Success judged by the presence of a logout link
//! - Numeric user id picked up from the landing page (or the dashboard)
//! - Expired sessions detected from page bodies and renewed once

use std::thread;
use std::time::Duration;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, error, info, warn};

use crate::error::{MonitorError, Result};
use crate::portal::{require_ok, PortalClient, PortalPage};

/// Markers of the login prompt showing up where content was expected.
const SESSION_EXPIRED_MARKERS: &[&str] = &["Log in to ODTUCLASS", "login/index.php"];

/// Patterns for the numeric user id, tried in order.
const USER_ID_PATTERNS: &[&str] = &[
    r"/user/profile\.php\?id=(\d+)",
    r"/user/view\.php\?id=(\d+)",
    r"[&?]user=(\d+)",
    r#"userid["']:\s*["']?(\d+)"#,
];

/// Result of checking a fetched page for session expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCheck {
    /// The page was served to a logged-in user.
    Valid,
    /// The session had expired and a fresh login succeeded; refetch the page.
    Renewed,
}

/// Value of the hidden `logintoken` input, if the form has one.
pub fn extract_login_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"input[name="logintoken"]"#).ok()?;
    document
        .select(&selector)
        .next()
        .map(|input| input.value().attr("value").unwrap_or("").to_string())
}

/// A logout link is only rendered for authenticated users.
pub fn has_logout_link(body: &str) -> bool {
    body.contains("logout.php")
}

pub fn looks_like_invalid_credentials(body: &str) -> bool {
    body.contains("Invalid login") || body.to_lowercase().contains("invalid")
}

/// True when the portal answered with its login prompt instead of content.
pub fn is_session_expired(body: &str) -> bool {
    !has_logout_link(body) && SESSION_EXPIRED_MARKERS.iter().any(|m| body.contains(m))
}

/// First user id found by [`USER_ID_PATTERNS`].
pub fn extract_user_id(body: &str) -> Option<String> {
    for pattern in USER_ID_PATTERNS {
        if let Ok(re) = Regex::new(pattern) {
            if let Some(caps) = re.captures(body) {
                if let Some(id) = caps.get(1) {
                    return Some(id.as_str().to_string());
                }
            }
        }
    }
    None
}

fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
}

/// One logged-in client context against the portal.
pub struct Session<P: PortalClient> {
    portal: P,
    base_url: String,
    username: String,
    password: String,
    user_id: Option<String>,
    authenticated: bool,
    login_delay: Duration,
}

impl<P: PortalClient> Session<P> {
    pub fn new(portal: P, base_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            portal,
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            user_id: None,
            authenticated: false,
            login_delay: Duration::from_secs(2),
        }
    }

    /// Pause taken before each login request.
    pub fn with_login_delay(mut self, delay: Duration) -> Self {
        self.login_delay = delay;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, page: &PortalPage) -> String {
        page.url(&self.base_url, self.user_id.as_deref())
    }

    /// Log in from scratch. Failures are logged here and returned; nothing
    /// is retried within this call.
    pub fn login(&mut self) -> Result<()> {
        self.authenticated = false;
        match self.try_login() {
            Ok(()) => {
                self.authenticated = true;
                info!("login successful");
                Ok(())
            }
            Err(e) => {
                match &e {
                    MonitorError::Timeout(_) => error!("login request timed out - server may be slow or blocking"),
                    MonitorError::InvalidCredentials => error!("login failed - invalid credentials"),
                    _ => {}
                }
                error!(error = %e, kind = %e.kind(), "login failed");
                Err(e)
            }
        }
    }

    fn try_login(&mut self) -> Result<()> {
        info!("attempting login");
        thread::sleep(self.login_delay);

        let login_url = self.url_for(&PortalPage::Login);
        let page = self.portal.get(&login_url)?;
        if !page.is_ok() {
            error!(status = page.status, final_url = %page.url, "login page returned unexpected status");
            return Err(MonitorError::HttpStatus {
                url: page.url,
                status: page.status,
            });
        }
        debug!(bytes = page.body.len(), "login page received");

        let token = match extract_login_token(&page.body) {
            Some(token) => token,
            None => {
                let title = page_title(&page.body).unwrap_or_else(|| "No title".to_string());
                error!(title = %title, "could not find login token in page");
                let lower = page.body.to_lowercase();
                if lower.contains("error") || lower.contains("blocked") {
                    error!("possible blocking or error page detected");
                }
                return Err(MonitorError::MissingToken);
            }
        };

        let form = [
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("logintoken", token.as_str()),
        ];
        let resp = self.portal.post_form(&login_url, &form, &login_url)?;

        if !has_logout_link(&resp.body) {
            if looks_like_invalid_credentials(&resp.body) {
                return Err(MonitorError::InvalidCredentials);
            }
            return Err(MonitorError::LoginRejected);
        }

        self.user_id = extract_user_id(&resp.body).or_else(|| self.user_id_from_dashboard());
        match &self.user_id {
            Some(id) => info!(user_id = %id, "extracted user id"),
            None => warn!("could not extract user id - course pages will be fetched without it"),
        }
        Ok(())
    }

    fn user_id_from_dashboard(&self) -> Option<String> {
        let url = self.url_for(&PortalPage::Dashboard);
        match self.portal.get(&url) {
            Ok(page) if page.is_ok() => extract_user_id(&page.body),
            Ok(page) => {
                warn!(status = page.status, "could not fetch dashboard for user id extraction");
                None
            }
            Err(e) => {
                warn!(error = %e, "error fetching dashboard for user id extraction");
                None
            }
        }
    }

    /// Check a fetched body for the login prompt. On expiry, log in again
    /// and tell the caller to refetch.
    pub fn ensure_session(&mut self, page_body: &str) -> Result<SessionCheck> {
        if !is_session_expired(page_body) {
            return Ok(SessionCheck::Valid);
        }
        warn!("session expired, logging in again");
        self.login()?;
        Ok(SessionCheck::Renewed)
    }

    /// Fetch a page as the logged-in user, logging in first if needed.
    /// An expired session gets one re-login and one refetch; a second
    /// expiry is an error.
    pub fn fetch(&mut self, page: &PortalPage) -> Result<String> {
        if !self.authenticated {
            self.login()?;
        }

        let body = require_ok(self.portal.get(&self.url_for(page))?)?.body;
        match self.ensure_session(&body)? {
            SessionCheck::Valid => Ok(body),
            SessionCheck::Renewed => {
                let body = require_ok(self.portal.get(&self.url_for(page))?)?.body;
                if is_session_expired(&body) {
                    self.authenticated = false;
                    return Err(MonitorError::SessionExpired(page.label()));
                }
                Ok(body)
            }
        }
    }

    /// Drop the session: clear cookies and cached identity.
    pub fn invalidate(&mut self) {
        if let Err(e) = self.portal.reset() {
            warn!(error = %e, "could not reset HTTP client");
        }
        self.authenticated = false;
        self.user_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::PageResponse;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    const LOGIN_PAGE: &str = r#"<html><head><title>Log in to ODTUCLASS</title></head><body>
        <form action="https://portal/login/index.php" method="post">
          <input type="hidden" name="logintoken" value="tok123">
          <input name="username"><input name="password" type="password">
        </form></body></html>"#;

    const LANDING_PAGE: &str = r#"<html><body>
        <a href="https://portal/user/profile.php?id=4711">Profile</a>
        <a href="https://portal/login/logout.php?sesskey=abc">Log out</a>
        </body></html>"#;

    /// Replays canned responses in order and records requests.
    struct ScriptedPortal {
        responses: RefCell<VecDeque<Result<PageResponse>>>,
        requests: RefCell<Vec<String>>,
        resets: usize,
    }

    impl ScriptedPortal {
        fn new(responses: Vec<Result<PageResponse>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                requests: RefCell::new(Vec::new()),
                resets: 0,
            }
        }

        fn next(&self, url: &str) -> Result<PageResponse> {
            self.requests.borrow_mut().push(url.to_string());
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(MonitorError::Network("no scripted response".into())))
        }
    }

    impl PortalClient for ScriptedPortal {
        fn get(&self, url: &str) -> Result<PageResponse> {
            self.next(url)
        }

        fn post_form(&self, url: &str, _form: &[(&str, &str)], _referer: &str) -> Result<PageResponse> {
            self.next(url)
        }

        fn reset(&mut self) -> Result<()> {
            self.resets += 1;
            Ok(())
        }
    }

    fn page(body: &str) -> Result<PageResponse> {
        Ok(PageResponse {
            status: 200,
            url: "https://portal/".to_string(),
            body: body.to_string(),
        })
    }

    fn session(responses: Vec<Result<PageResponse>>) -> Session<ScriptedPortal> {
        Session::new(ScriptedPortal::new(responses), "https://portal", "e123", "secret")
            .with_login_delay(Duration::ZERO)
    }

    #[test]
    fn test_extract_login_token() {
        assert_eq!(extract_login_token(LOGIN_PAGE).as_deref(), Some("tok123"));
        assert_eq!(
            extract_login_token(r#"<input name="logintoken">"#).as_deref(),
            Some("")
        );
        assert_eq!(extract_login_token("<html><body>blocked</body></html>"), None);
    }

    #[test]
    fn test_extract_user_id_pattern_order() {
        assert_eq!(extract_user_id(LANDING_PAGE).as_deref(), Some("4711"));
        assert_eq!(
            extract_user_id(r#"<a href="/user/view.php?id=88&course=1">"#).as_deref(),
            Some("88")
        );
        assert_eq!(
            extract_user_id(r#"<a href="/grade/report/user/index.php?id=5&user=99">"#).as_deref(),
            Some("99")
        );
        assert_eq!(extract_user_id(r#"M.cfg = {"userid": 1234}"#).as_deref(), Some("1234"));
        assert_eq!(extract_user_id("<p>nothing here</p>"), None);
    }

    #[test]
    fn test_session_expiry_detection() {
        assert!(is_session_expired(LOGIN_PAGE));
        assert!(!is_session_expired(LANDING_PAGE));
        assert!(!is_session_expired("<table id=\"overview-grade\"></table>"));
    }

    #[test]
    fn test_login_success_sets_user_id() {
        let mut s = session(vec![page(LOGIN_PAGE), page(LANDING_PAGE)]);
        assert!(s.login().is_ok());
        assert!(s.is_authenticated());
        assert_eq!(s.user_id(), Some("4711"));
    }

    #[test]
    fn test_login_falls_back_to_dashboard_for_user_id() {
        let landing = r#"<a href="/login/logout.php">Log out</a>"#;
        let dashboard = r#"<a href="/user/view.php?id=321">me</a>"#;
        let mut s = session(vec![page(LOGIN_PAGE), page(landing), page(dashboard)]);
        assert!(s.login().is_ok());
        assert_eq!(s.user_id(), Some("321"));
        assert_eq!(s.portal.requests.borrow()[2], "https://portal/my/");
    }

    #[test]
    fn test_login_without_user_id_is_not_fatal() {
        let landing = r#"<a href="/login/logout.php">Log out</a>"#;
        let mut s = session(vec![page(LOGIN_PAGE), page(landing), page("<p>dashboard</p>")]);
        assert!(s.login().is_ok());
        assert_eq!(s.user_id(), None);
    }

    #[test]
    fn test_login_missing_token() {
        let mut s = session(vec![page("<html><title>Error</title><body>blocked</body></html>")]);
        assert!(matches!(s.login(), Err(MonitorError::MissingToken)));
        assert!(!s.is_authenticated());
    }

    #[test]
    fn test_login_invalid_credentials() {
        let rejected = r#"<div class="alert">Invalid login, please try again</div>"#;
        let mut s = session(vec![page(LOGIN_PAGE), page(rejected)]);
        assert!(matches!(s.login(), Err(MonitorError::InvalidCredentials)));
    }

    #[test]
    fn test_login_rejected_without_known_phrase() {
        let mut s = session(vec![page(LOGIN_PAGE), page("<p>Something went wrong</p>")]);
        assert!(matches!(s.login(), Err(MonitorError::LoginRejected)));
    }

    #[test]
    fn test_login_timeout_is_reported() {
        let mut s = session(vec![Err(MonitorError::Timeout("login".into()))]);
        assert!(matches!(s.login(), Err(MonitorError::Timeout(_))));
    }

    #[test]
    fn test_fetch_relogs_once_on_expiry() {
        let content = r#"<a href="/login/logout.php">x</a><table id="overview-grade"></table>"#;
        let mut s = session(vec![
            page(LOGIN_PAGE),
            page(LANDING_PAGE),
            page(LOGIN_PAGE), // expired
            page(LOGIN_PAGE),
            page(LANDING_PAGE),
            page(content),
        ]);
        let body = s.fetch(&PortalPage::Overview).unwrap();
        assert!(body.contains("overview-grade"));
        assert_eq!(s.portal.requests.borrow().len(), 6);
    }

    #[test]
    fn test_fetch_fails_when_still_expired_after_relogin() {
        let mut s = session(vec![
            page(LOGIN_PAGE),
            page(LANDING_PAGE),
            page(LOGIN_PAGE),
            page(LOGIN_PAGE),
            page(LANDING_PAGE),
            page(LOGIN_PAGE),
        ]);
        assert!(matches!(
            s.fetch(&PortalPage::Overview),
            Err(MonitorError::SessionExpired(_))
        ));
        assert!(!s.is_authenticated());
    }

    #[test]
    fn test_invalidate_resets_client() {
        let mut s = session(vec![page(LOGIN_PAGE), page(LANDING_PAGE)]);
        s.login().unwrap();
        s.invalidate();
        assert!(!s.is_authenticated());
        assert_eq!(s.user_id(), None);
        assert_eq!(s.portal.resets, 1);
    }
}
