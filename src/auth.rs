// OAuth authorization-code flow: consent URL, code capture through the
// local callback listener, code and refresh-token exchange, and storing
// the resulting grant.

use chrono::Utc;
use reqwest::StatusCode;
use reqwest::Url;
use tracing::{debug, info};

use crate::api::{decode_error, Client};
use crate::callback::CallbackListener;
use crate::error::{Error, Result};
use crate::token::TokenGrant;

impl Client {
    /// Consent page the user has to open in a browser.
    pub fn login_url(&self) -> Result<String> {
        let config = self.config();
        let scope = config.scope_string();
        let url = Url::parse_with_params(
            &self.endpoints().authorize_url(),
            &[
                ("client_id", config.client_id.as_str()),
                ("scope", scope.as_str()),
                ("response_type", "code"),
                ("redirect_uri", config.redirect_url.as_str()),
            ],
        )
        .map_err(|e| Error::Config(format!("invalid authorization endpoint: {}", e)))?;
        Ok(url.to_string())
    }

    /// Run the whole flow on the listener address taken from the redirect URL.
    pub fn login(&mut self) -> Result<TokenGrant> {
        let listener = CallbackListener::for_redirect(&self.config().redirect_url)?;
        self.login_with(listener)
    }

    /// Wait for the browser redirect on `listener`, then redeem the code.
    pub fn login_with(&mut self, listener: CallbackListener) -> Result<TokenGrant> {
        let code = listener.wait_for_code()?;
        self.redeem_code(&code)
    }

    /// Exchange an authorization code for tokens and store them.
    pub fn redeem_code(&mut self, code: &str) -> Result<TokenGrant> {
        info!("redeeming authorization code");
        let grant = {
            let config = self.config();
            self.request_grant(&[
                ("client_id", config.client_id.as_str()),
                ("redirect_uri", config.redirect_url.as_str()),
                ("client_secret", config.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])?
        };
        self.store_grant(&grant)?;
        Ok(grant)
    }

    pub fn should_renew_access_token(&self) -> bool {
        self.config().credentials.should_renew()
    }

    /// Mint a new access token from the stored refresh token.
    pub fn renew_access_token(&mut self) -> Result<TokenGrant> {
        if self.config().credentials.refresh_token.is_empty() {
            return Err(Error::NotLoggedIn);
        }
        debug!("renewing access token");
        let grant = {
            let config = self.config();
            self.request_grant(&[
                ("client_id", config.client_id.as_str()),
                ("redirect_uri", config.redirect_url.as_str()),
                ("client_secret", config.client_secret.as_str()),
                ("refresh_token", config.credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])?
        };
        self.store_grant(&grant)?;
        Ok(grant)
    }

    fn request_grant(&self, params: &[(&str, &str)]) -> Result<TokenGrant> {
        let response = self.post_form(&self.endpoints().token_url(), params)?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized);
        }
        if !status.is_success() {
            let body = response.bytes().unwrap_or_default();
            return Err(decode_error(status.as_u16(), &body));
        }
        let grant: TokenGrant = response.json()?;
        if grant.access_token.is_empty() {
            return Err(Error::EmptyAccessToken);
        }
        debug!(expires_in = grant.expires_in, "token grant received");
        Ok(grant)
    }

    fn store_grant(&mut self, grant: &TokenGrant) -> Result<()> {
        let config = self.config_mut();
        config.credentials.apply(grant, Utc::now());
        config.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Endpoints;
    use crate::config::Config;
    use chrono::Duration;
    use mockito::Matcher;
    use std::net::SocketAddr;
    use std::thread;

    const GRANT: &str = r#"{
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": "Files.ReadWrite offline_access",
        "access_token": "new-access",
        "refresh_token": "new-refresh"
    }"#;

    fn client(base: &str, dir: &tempfile::TempDir) -> Client {
        let mut config = Config::from_json(
            r#"{
                "client_id": "cid",
                "client_secret": "secret",
                "scopes": ["Files.ReadWrite", "offline_access"],
                "redirect_uri": "http://localhost:53682/",
                "root": "/drive/root"
            }"#,
        )
        .unwrap();
        config.save_to(&dir.path().join("config.json")).unwrap();
        Client::with_endpoints(config, Endpoints::local(base)).unwrap()
    }

    #[test]
    fn login_url_carries_all_params() {
        let dir = tempfile::tempdir().unwrap();
        let c = client("http://mock", &dir);
        let url = Url::parse(&c.login_url().unwrap()).unwrap();
        assert_eq!(url.path(), "/oauth2/v2.0/authorize");

        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(params.contains(&("client_id".into(), "cid".into())));
        assert!(params.contains(&("scope".into(), "Files.ReadWrite offline_access".into())));
        assert!(params.contains(&("response_type".into(), "code".into())));
        assert!(params.contains(&("redirect_uri".into(), "http://localhost:53682/".into())));
    }

    #[test]
    fn redeem_code_stores_and_persists_grant() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/oauth2/v2.0/token")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "ABC123".into()),
                Matcher::UrlEncoded("client_id".into(), "cid".into()),
                Matcher::UrlEncoded("client_secret".into(), "secret".into()),
                Matcher::UrlEncoded("redirect_uri".into(), "http://localhost:53682/".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(GRANT)
            .create();

        let dir = tempfile::tempdir().unwrap();
        let mut c = client(&server.url(), &dir);
        let before = Utc::now();
        c.redeem_code("ABC123").unwrap();
        mock.assert();

        let creds = &c.config().credentials;
        assert_eq!(creds.access_token, "new-access");
        assert_eq!(creds.refresh_token, "new-refresh");
        let drift = creds.expiry - (before + Duration::seconds(3600));
        assert!(drift >= Duration::zero() && drift <= Duration::seconds(1));

        let reloaded = Config::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(reloaded.credentials, *creds);
    }

    #[test]
    fn renew_uses_refresh_grant() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/oauth2/v2.0/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "old-refresh".into()),
            ]))
            .with_status(200)
            .with_body(GRANT)
            .create();

        let dir = tempfile::tempdir().unwrap();
        let mut c = client(&server.url(), &dir);
        c.config_mut().credentials.refresh_token = "old-refresh".into();
        assert!(c.should_renew_access_token());

        c.renew_access_token().unwrap();
        mock.assert();
        assert_eq!(c.config().credentials.access_token, "new-access");
        assert!(!c.should_renew_access_token());
    }

    #[test]
    fn renew_without_refresh_token_sends_nothing() {
        let mut server = mockito::Server::new();
        let mock = server.mock("POST", Matcher::Any).expect(0).create();
        let dir = tempfile::tempdir().unwrap();
        let mut c = client(&server.url(), &dir);

        assert!(matches!(c.renew_access_token(), Err(Error::NotLoggedIn)));
        mock.assert();
    }

    #[test]
    fn unauthorized_gets_hint() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/oauth2/v2.0/token")
            .with_status(401)
            .with_body(r#"{"error": "invalid_client"}"#)
            .create();
        let dir = tempfile::tempdir().unwrap();
        let mut c = client(&server.url(), &dir);

        let err = c.redeem_code("x").unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
        assert!(err.to_string().contains("client secret"));
        assert!(c.config().credentials.access_token.is_empty());
    }

    #[test]
    fn other_failures_are_decoded() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/oauth2/v2.0/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant", "error_description": "code expired"}"#)
            .create();
        let dir = tempfile::tempdir().unwrap();
        let mut c = client(&server.url(), &dir);

        match c.redeem_code("x").unwrap_err() {
            Error::Api { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code, "invalid_grant");
                assert_eq!(message, "code expired");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_access_token_is_a_failure() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/oauth2/v2.0/token")
            .with_status(200)
            .with_body(r#"{"token_type": "Bearer", "expires_in": 3600, "access_token": ""}"#)
            .create();
        let dir = tempfile::tempdir().unwrap();
        let mut c = client(&server.url(), &dir);

        assert!(matches!(c.redeem_code("x"), Err(Error::EmptyAccessToken)));
    }

    #[test]
    fn login_with_listener_completes_flow() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/oauth2/v2.0/token")
            .match_body(Matcher::UrlEncoded("code".into(), "ABC123".into()))
            .with_status(200)
            .with_body(GRANT)
            .create();

        let dir = tempfile::tempdir().unwrap();
        let mut c = client(&server.url(), &dir);
        let listener = CallbackListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        let callback = format!("http://{}/?code=ABC123", listener.local_addr().unwrap());

        let browser = thread::spawn(move || {
            reqwest::blocking::get(callback).map(|r| r.status())
        });
        c.login_with(listener).unwrap();

        assert_eq!(browser.join().unwrap().unwrap(), reqwest::StatusCode::OK);
        mock.assert();
        assert_eq!(c.config().credentials.access_token, "new-access");
    }
}
