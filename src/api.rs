// API client module: a small blocking HTTP client for the drive API and
// the OAuth token endpoint. Every request goes through here so auth
// headers, URL layout and error decoding live in one place.

use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::signal::Signals;

pub const GRAPH_URL: &str = "https://graph.microsoft.com/v1.0/";
pub const LOGIN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0";

/// Base URLs of the services the client talks to.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Drive API root, with trailing slash.
    pub api: String,
    /// OAuth root; `/authorize` and `/token` are appended.
    pub auth: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            api: GRAPH_URL.to_string(),
            auth: LOGIN_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Point both services at one base URL, e.g. a local mock server.
    pub fn local(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Endpoints {
            api: format!("{}/v1.0/", base),
            auth: format!("{}/oauth2/v2.0", base),
        }
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/authorize", self.auth.trim_end_matches('/'))
    }

    pub fn token_url(&self) -> String {
        format!("{}/token", self.auth.trim_end_matches('/'))
    }
}

/// Drive API client. Owns the config (and with it the stored tokens) and
/// the signal emitter transfers report progress to.
pub struct Client {
    http: HttpClient,
    config: Config,
    endpoints: Endpoints,
    signals: Signals,
}

impl Client {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_endpoints(config, Endpoints::default())
    }

    pub fn with_endpoints(config: Config, endpoints: Endpoints) -> Result<Self> {
        // No overall timeout: a single chunk on a slow link can take minutes.
        let http = HttpClient::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()?;
        Ok(Client {
            http,
            config,
            endpoints,
            signals: Signals::disabled(),
        })
    }

    /// Route transfer signals to an observer. Disabled by default.
    pub fn set_signals(&mut self, signals: Signals) {
        self.signals = signals;
    }

    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// `{api}me{root}` followed by `suffix`.
    pub(crate) fn drive_url(&self, suffix: &str) -> String {
        format!("{}me{}{}", self.endpoints.api, self.config.root, suffix)
    }

    /// URL addressing an item by path; `/` addresses the root itself.
    pub(crate) fn item_url(&self, path: &str) -> String {
        if path == "/" {
            self.drive_url("")
        } else {
            self.drive_url(&format!(":{}", path))
        }
    }

    /// URL of an item's sub-resource, e.g. `children` or `content`.
    pub(crate) fn item_action_url(&self, path: &str, action: &str) -> String {
        if path == "/" {
            self.drive_url(&format!("/{}", action))
        } else {
            self.drive_url(&format!(":{}:/{}", path, action))
        }
    }

    /// Request builder without credentials, for pre-authorized URLs.
    pub(crate) fn request(&self, method: Method, url: &str) -> RequestBuilder {
        debug!(%method, url, "request");
        self.http.request(method, url)
    }

    /// Request builder carrying the bearer token. Refuses to run without one.
    pub(crate) fn authed(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let token = &self.config.credentials.access_token;
        if token.is_empty() {
            return Err(Error::NotLoggedIn);
        }
        Ok(self
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", token)))
    }

    /// Authenticated GET decoding a JSON body; 404 becomes `NotFound(what)`.
    pub(crate) fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<T> {
        let response = self.authed(Method::GET, url)?.query(query).send()?;
        let response = check_found(response, what)?;
        Ok(response.json()?)
    }

    /// Form-encoded POST without credentials (token endpoint).
    pub(crate) fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<Response> {
        Ok(self.request(Method::POST, url).form(params).send()?)
    }
}

/// Graph error envelope: `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Deserialize)]
struct GraphError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Graph {
        error: GraphError,
    },
    OAuth {
        error: String,
        #[serde(default)]
        error_description: String,
    },
}

/// Turn a non-2xx status and its body into an `Error`.
pub fn decode_error(status: u16, body: &[u8]) -> Error {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody::Graph { error }) => Error::Api {
            status,
            code: error.code,
            message: error.message,
        },
        Ok(ErrorBody::OAuth {
            error,
            error_description,
        }) => Error::Api {
            status,
            code: error,
            message: error_description,
        },
        Err(_) => Error::UnexpectedStatus(status),
    }
}

/// Pass 2xx responses through, decode everything else.
pub(crate) fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().unwrap_or_default();
    debug!(status = status.as_u16(), "request failed");
    Err(decode_error(status.as_u16(), &body))
}

/// Like `check`, with 404 reported as `NotFound(what)`.
pub(crate) fn check_found(response: Response, what: &str) -> Result<Response> {
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(Error::NotFound(what.to_string()));
    }
    check(response)
}
