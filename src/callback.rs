// Local HTTP listener catching the OAuth redirect. The browser is sent to
// the consent page and comes back to `redirect_uri?code=...`; this module
// serves that single request and shuts itself down.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::Router;
use tokio::sync::Notify;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Port the listener uses when the redirect URL does not name one.
pub const DEFAULT_CALLBACK_PORT: u16 = 53682;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const SUCCESS_PAGE: &str = "<!DOCTYPE html><html><head><title>Login successful</title></head>\
<body><h1>Login successful</h1><p>You can close this window and return to the terminal.</p></body></html>";

const NOT_FOUND_PAGE: &str = "<!DOCTYPE html><html><head><title>Not found</title></head>\
<body><h1>Not found</h1><p>No authorization code in this request.</p></body></html>";

#[derive(Default)]
struct CallbackState {
    code: Mutex<Option<String>>,
    received: Notify,
}

/// A bound listener waiting for exactly one authorization code.
pub struct CallbackListener {
    listener: TcpListener,
}

impl CallbackListener {
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| Error::Callback(format!("could not bind {}: {}", addr, e)))?;
        Ok(CallbackListener { listener })
    }

    /// Bind all interfaces on the port named by `redirect_url`.
    pub fn for_redirect(redirect_url: &str) -> Result<Self> {
        Self::bind(SocketAddr::from(([0, 0, 0, 0], callback_port(redirect_url))))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| Error::Callback(e.to_string()))
    }

    /// Serve until a request carrying `code` arrives, then shut down and
    /// return the code. Blocks the calling thread; there is no overall
    /// timeout. The socket is released on every return path.
    pub fn wait_for_code(self) -> Result<String> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Callback(e.to_string()))?;

        let state = Arc::new(CallbackState::default());
        let addr = self.local_addr()?;
        info!(%addr, "waiting for authorization code");

        runtime.block_on(serve(self.listener, Arc::clone(&state)))?;

        let code = state
            .code
            .lock()
            .map_err(|_| Error::Callback("callback state poisoned".into()))?
            .take();
        code.ok_or_else(|| Error::Callback("listener stopped without a code".into()))
    }
}

async fn serve(listener: TcpListener, state: Arc<CallbackState>) -> Result<()> {
    listener
        .set_nonblocking(true)
        .map_err(|e| Error::Callback(e.to_string()))?;
    let listener =
        tokio::net::TcpListener::from_std(listener).map_err(|e| Error::Callback(e.to_string()))?;

    let shutdown = Arc::clone(&state);
    // The redirect URL may carry any path; every path is served the same.
    let app = Router::new()
        .fallback(handle_callback)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.received.notified().await })
        .await
        .map_err(|e| Error::Callback(e.to_string()))
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<&'static str>) {
    match params.get("code").filter(|c| !c.is_empty()) {
        Some(code) => {
            debug!("authorization code received");
            if let Ok(mut slot) = state.code.lock() {
                *slot = Some(code.clone());
            }
            // notify_one keeps a permit, so the shutdown future sees it even
            // if it starts waiting afterwards.
            state.received.notify_one();
            (StatusCode::OK, Html(SUCCESS_PAGE))
        }
        None => (StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE)),
    }
}

/// Port from the redirect URL, falling back to the default.
pub fn callback_port(redirect_url: &str) -> u16 {
    reqwest::Url::parse(redirect_url)
        .ok()
        .and_then(|u| u.port())
        .unwrap_or(DEFAULT_CALLBACK_PORT)
}
