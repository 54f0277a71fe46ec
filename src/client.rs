use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client as ReqwestClient, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::client_logger::ClientLogger;
use crate::config::{ApiRoutes, ClientConfig};
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS, SESSION_EXPIRED,
};
use crate::session_store::{SessionToken, TokenStore};
use crate::types::{LoginResponse, RegisterParams, RegisterResponse};

/// The endpoints this client talks to, for error mapping and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Register,
    Login,
    FetchHistory,
    SendMessage,
}

impl Operation {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Operation::Register => "register",
            Operation::Login => "login",
            Operation::FetchHistory => "fetch_history",
            Operation::SendMessage => "send_message",
        }
    }

    fn fallback_message(self) -> &'static str {
        match self {
            Operation::Register => "Registration failed",
            Operation::Login => "Invalid username or password",
            Operation::FetchHistory => "Failed to fetch chat history",
            Operation::SendMessage => "Failed to send message",
        }
    }

    fn is_authenticated(self) -> bool {
        matches!(self, Operation::FetchHistory | Operation::SendMessage)
    }
}

/// Client for the chat API.
///
/// Covers account management (register, login, logout) directly; the authenticated chat
/// endpoints are exposed through [`ChatApi`](crate::ChatApi).  The token store is consulted on
/// every authenticated call and purged whenever the server answers 401.
#[derive(Clone)]
pub struct Palaver {
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
    routes: ApiRoutes,
    store: Arc<dyn TokenStore>,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl Palaver {
    /// Create a new client.
    ///
    /// The base URL is read from the PALAVER_BASE_URL environment variable and falls back to
    /// `http://localhost:8000/`.
    pub fn new(store: Arc<dyn TokenStore>) -> Result<Self> {
        Self::from_config(&ClientConfig::default(), store)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        base_url: Option<String>,
        timeout: Option<Duration>,
        routes: Option<ApiRoutes>,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self> {
        let config = ClientConfig {
            base_url,
            routes,
            ..ClientConfig::default()
        };
        let mut client = Self::from_config(&config, store)?;
        if let Some(timeout) = timeout {
            client = client.with_timeout(timeout)?;
        }
        Ok(client)
    }

    /// Create a new client from a resolved configuration.
    pub fn from_config(config: &ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        let base_url = parse_base_url(&config.resolved_base_url())?;
        let timeout = config.timeout();
        let client = build_http_client(timeout)?;
        Ok(Self {
            client,
            base_url,
            timeout,
            routes: config.resolved_routes(),
            store,
            logger: None,
        })
    }

    /// Replace the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_http_client(timeout)?;
        self.timeout = timeout;
        Ok(self)
    }

    /// Attach a logger that sees every listing, every new turn and every failure.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The endpoint paths in use.
    pub fn routes(&self) -> &ApiRoutes {
        &self.routes
    }

    /// The store holding the session token.
    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// True when a session token is stored locally.  Says nothing about whether the server
    /// still accepts it.
    pub fn is_authenticated(&self) -> Result<bool> {
        Ok(self.store.read()?.is_some())
    }

    /// Create an account.
    ///
    /// Input the server rejects surfaces as [`Error::Validation`] carrying the server's detail
    /// verbatim.  Registration does not log the user in.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterResponse> {
        let params = RegisterParams::new(username, email, password);
        params.validate()?;

        let url = self.endpoint(&self.routes.register)?;
        let request = self.client.post(url).json(&params);
        let response = self.execute(Operation::Register, request).await?;
        self.parse_json(Operation::Register, response).await
    }

    /// Exchange credentials for a session token and persist it.
    ///
    /// Bad credentials surface as [`Error::Authentication`] and are never retried.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        if username.trim().is_empty() {
            return Err(Error::validation(
                "username must not be empty",
                Some("username".to_string()),
            ));
        }
        if password.is_empty() {
            return Err(Error::validation(
                "password must not be empty",
                Some("password".to_string()),
            ));
        }

        let url = self.endpoint(&self.routes.login)?;
        let request = self
            .client
            .post(url)
            .form(&[("username", username), ("password", password)]);
        let response = self.execute(Operation::Login, request).await?;
        let login: LoginResponse = self.parse_json(Operation::Login, response).await?;
        if login.access_token.is_empty() {
            let err = Error::authentication("server returned an empty access token");
            self.log_error(Operation::Login, &err);
            return Err(err);
        }
        self.store.save(&SessionToken::new(login.access_token.clone()))?;
        Ok(login)
    }

    /// Forget the session token.
    pub fn logout(&self) -> Result<()> {
        self.store.clear()
    }

    /// The stored token, or [`Error::AuthRequired`] without touching the network.
    pub(crate) fn require_token(&self) -> Result<SessionToken> {
        self.store
            .read()?
            .ok_or_else(|| Error::auth_required("No authentication token found"))
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    pub(crate) fn http(&self) -> &ReqwestClient {
        &self.client
    }

    pub(crate) fn logger(&self) -> Option<&Arc<dyn ClientLogger>> {
        self.logger.as_ref()
    }

    /// Send `request` and return the response if its status is a success.
    pub(crate) async fn execute(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<Response> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let sent = request.send().await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                let err = if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {}", e),
                        Some(self.timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
                };
                self.log_error(operation, &err);
                return Err(err);
            }
        };

        if response.status().is_success() {
            return Ok(response);
        }
        let err = self.process_error_response(operation, response).await;
        self.log_error(operation, &err);
        Err(err)
    }

    pub(crate) async fn parse_json<T: DeserializeOwned>(
        &self,
        operation: Operation,
        response: Response,
    ) -> Result<T> {
        response.json::<T>().await.map_err(|e| {
            let err = Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            );
            self.log_error(operation, &err);
            err
        })
    }

    fn log_error(&self, operation: Operation, err: &Error) {
        CLIENT_REQUEST_ERRORS.click();
        if let Some(logger) = &self.logger {
            logger.log_error(operation.name(), err);
        }
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(&self, operation: Operation, response: Response) -> Error {
        let status = response.status();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let body = response.text().await;

        // A 401 purges the token whether or not the body made it here intact.
        if status == StatusCode::UNAUTHORIZED && operation.is_authenticated() {
            let message = body
                .ok()
                .as_deref()
                .and_then(extract_detail)
                .unwrap_or_else(|| operation.fallback_message().to_string());
            return self.expire_session(message);
        }

        let body = match body {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };
        let message =
            extract_detail(&body).unwrap_or_else(|| operation.fallback_message().to_string());
        map_status(operation, status.as_u16(), message, retry_after)
    }

    /// The server no longer accepts our token: purge it before reporting.
    fn expire_session(&self, message: String) -> Error {
        SESSION_EXPIRED.click();
        match self.store.clear() {
            Ok(()) => Error::session_expired(message),
            Err(err) => Error::session_expired(format!(
                "{message} (the stored token could not be removed: {err})"
            )),
        }
    }
}

impl std::fmt::Debug for Palaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Palaver")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("routes", &self.routes)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

fn build_http_client(timeout: Duration) -> Result<ReqwestClient> {
    ReqwestClient::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {}", e),
                Some(Box::new(e)),
            )
        })
}

/// Parse a base URL, making sure relative joins land beneath it.
fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    if url.cannot_be_a_base() {
        return Err(Error::url(format!("{raw} cannot be a base URL"), None));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Pull the human-readable `detail` out of an error body.
///
/// `detail` is either a string or a list of `{loc, msg}` validation records; lists are joined.
fn extract_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(detail) => Some(detail.clone()),
        Value::Array(items) => {
            let messages: Vec<String> = items.iter().filter_map(describe_validation_item).collect();
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
        _ => None,
    }
}

fn describe_validation_item(item: &Value) -> Option<String> {
    let msg = item.get("msg")?.as_str()?;
    let field = item
        .get("loc")
        .and_then(Value::as_array)
        .and_then(|loc| loc.last())
        .and_then(|last| match last {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
    match field {
        Some(field) => Some(format!("{field}: {msg}")),
        None => Some(msg.to_string()),
    }
}

fn map_status(
    operation: Operation,
    status: u16,
    message: String,
    retry_after: Option<u64>,
) -> Error {
    match (operation, status) {
        (_, 408) => Error::timeout(message, None),
        (_, 429) => Error::rate_limit(message, retry_after),
        (_, 500) => Error::internal_server(message),
        (_, 502..=504) => Error::service_unavailable(message, retry_after),
        (Operation::Login, 400 | 401 | 403 | 422) => Error::authentication(message),
        (Operation::Register, 400..=499) => Error::validation(message, None),
        _ => Error::api(status, message),
    }
}
