//! Portal HTTP access
//!
//! Cookie-based page fetching against the grading portal. The
//! [`PortalClient`] trait is the seam the session and scrapers talk to;
//! [`HttpPortal`] is the blocking `reqwest` implementation.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{self, HeaderMap, HeaderValue};

use crate::error::{MonitorError, Result};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A fetched page.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    pub body: String,
}

impl PageResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Minimal HTTP surface the pipeline needs from the portal.
pub trait PortalClient {
    fn get(&self, url: &str) -> Result<PageResponse>;

    fn post_form(&self, url: &str, form: &[(&str, &str)], referer: &str) -> Result<PageResponse>;

    /// Forget all cookies so the next request starts unauthenticated.
    fn reset(&mut self) -> Result<()>;
}

/// Pages of the portal the monitor reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalPage {
    Login,
    Dashboard,
    Overview,
    CourseDetail { course_id: String },
}

impl PortalPage {
    /// Absolute URL of the page. Course detail pages name the user when the
    /// id is known and fall back to the user-agnostic form otherwise.
    pub fn url(&self, base_url: &str, user_id: Option<&str>) -> String {
        let base = base_url.trim_end_matches('/');
        match (self, user_id) {
            (PortalPage::Login, _) => format!("{}/login/index.php", base),
            (PortalPage::Dashboard, _) => format!("{}/my/", base),
            (PortalPage::Overview, _) => format!("{}/grade/report/overview/index.php", base),
            (PortalPage::CourseDetail { course_id }, Some(user)) => {
                format!("{}/course/user.php?mode=grade&id={}&user={}", base, course_id, user)
            }
            (PortalPage::CourseDetail { course_id }, None) => {
                format!("{}/course/user.php?mode=grade&id={}", base, course_id)
            }
        }
    }

    /// Short label for log fields.
    pub fn label(&self) -> String {
        match self {
            PortalPage::Login => "login".to_string(),
            PortalPage::Dashboard => "dashboard".to_string(),
            PortalPage::Overview => "overview".to_string(),
            PortalPage::CourseDetail { course_id } => format!("course {}", course_id),
        }
    }
}

/// Blocking `reqwest` client with a cookie jar.
pub struct HttpPortal {
    client: Client,
    timeout: Duration,
}

impl HttpPortal {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            timeout,
        })
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9,tr;q=0.8"));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

    let client = Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .cookie_store(true)
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?;
    Ok(client)
}

fn into_page(resp: reqwest::blocking::Response) -> Result<PageResponse> {
    let status = resp.status().as_u16();
    let url = resp.url().to_string();
    let body = resp.text()?;
    Ok(PageResponse { status, url, body })
}

impl PortalClient for HttpPortal {
    fn get(&self, url: &str) -> Result<PageResponse> {
        let resp = self.client.get(url).send()?;
        into_page(resp)
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)], referer: &str) -> Result<PageResponse> {
        let resp = self
            .client
            .post(url)
            .header(header::REFERER, referer)
            .form(form)
            .send()?;
        into_page(resp)
    }

    fn reset(&mut self) -> Result<()> {
        self.client = build_client(self.timeout)?;
        Ok(())
    }
}

/// Turn a non-200 page into an error.
pub fn require_ok(page: PageResponse) -> Result<PageResponse> {
    if page.is_ok() {
        Ok(page)
    } else {
        Err(MonitorError::HttpStatus {
            url: page.url,
            status: page.status,
        })
    }
}
