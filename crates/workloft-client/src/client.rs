//! The API client: queue pair, dispatch, and auth recovery

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use workloft_runtime::{Delivery, ListenerId, SerialQueue, TaskState};

use crate::callback::GlobalRegistry;
use crate::config::{ClientConfig, RequestOptions};
use crate::error::{ClientError, Result};
use crate::filter::Filter;
use crate::retry::RetryConfig;
use crate::session::{Session, SessionStore};
use crate::task::RequestTask;

/// Margin over the transport timeout when waiting on a refresh exchange,
/// so the exchange can report its own timeout instead of being abandoned.
const REFRESH_WAIT_MARGIN: Duration = Duration::from_secs(1);

type RunFn = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;
type FailFn = Box<dyn FnOnce(ClientError) + Send>;

/// A dispatched call waiting on one of the client's queues. `fail` lets
/// the queue settle the task without running it, when a failed refresh
/// invalidates everything behind it.
pub(crate) struct QueuedCall {
    run: RunFn,
    fail: FailFn,
}

#[derive(Debug, Clone)]
enum Payload {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
struct CallSpec {
    method: Method,
    url: Url,
    payload: Payload,
    is_auth: bool,
    timeout: Duration,
    retry: RetryConfig,
}

/// Asynchronous client for the Workloft API.
///
/// `request` hands back a [`RequestTask`] immediately; the work runs on
/// the client's main queue in submission order. Auth exchanges run on a
/// separate refresh queue so an expired session can be repaired while
/// ordinary traffic is held back. Cloning shares the queues, session and
/// global listener registry.
///
/// Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    config: ClientConfig,
    scheme: String,
    authority: String,
    auth_url: Url,
    session: SessionStore,
    globals: Arc<GlobalRegistry>,
    delivery: Delivery,
    main: SerialQueue<QueuedCall>,
    refresh: SerialQueue<QueuedCall>,
}

impl Client {
    /// Create a client with a fresh, unauthenticated session.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_session(config, SessionStore::new())
    }

    /// Create a client around an existing session store.
    pub fn with_session(config: ClientConfig, session: SessionStore) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|err| ClientError::InvalidUrl(format!("{}: {err}", config.base_url)))?;
        let scheme = base.scheme().to_string();
        let authority = base.authority().to_string();
        if authority.is_empty() {
            return Err(ClientError::InvalidUrl(config.base_url.clone()));
        }
        let auth_url = Filter::new("oauth")
            .segment("token")
            .build_uri(&scheme, &authority)?;

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|err| ClientError::Build(err.to_string()))?;

        let delivery = Delivery::spawn();
        let main = SerialQueue::spawn("api", |call: QueuedCall| (call.run)());
        let refresh = SerialQueue::spawn("auth", |call: QueuedCall| (call.run)());

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                config,
                scheme,
                authority,
                auth_url,
                session,
                globals: Arc::new(GlobalRegistry::new()),
                delivery,
                main,
                refresh,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    /// Restore a previously persisted session.
    pub fn restore_session(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        transfer_token: impl Into<String>,
        expires: i64,
    ) {
        self.inner
            .session
            .set_tokens(access_token, refresh_token, transfer_token, expires);
    }

    /// Drop the current session tokens.
    pub fn forget_session(&self) {
        self.inner.session.clear();
    }

    pub fn add_global_error_listener<F>(&self, listener: F) -> ListenerId
    where
        F: FnMut(&ClientError) -> bool + Send + 'static,
    {
        self.inner.globals.add_error_listener(listener)
    }

    pub fn remove_global_error_listener(&self, id: ListenerId) -> bool {
        self.inner.globals.remove_error_listener(id)
    }

    pub fn add_global_session_listener<F>(&self, listener: F) -> ListenerId
    where
        F: FnMut(&Session) -> bool + Send + 'static,
    {
        self.inner.globals.add_session_listener(listener)
    }

    pub fn remove_global_session_listener(&self, id: ListenerId) -> bool {
        self.inner.globals.remove_session_listener(id)
    }

    /// Dispatch a request with the client's default timeout and retry.
    pub fn request<T>(
        &self,
        method: Method,
        filter: &Filter,
        body: Option<serde_json::Value>,
    ) -> RequestTask<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.request_with_options(method, filter, body, RequestOptions::default())
    }

    /// Dispatch a request with per-request overrides.
    pub fn request_with_options<T>(
        &self,
        method: Method,
        filter: &Filter,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> RequestTask<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let task: RequestTask<T> =
            RequestTask::new(self.inner.delivery.clone(), self.inner.globals.clone(), false);

        let url = match filter.build_uri(&self.inner.scheme, &self.inner.authority) {
            Ok(url) => url,
            Err(err) => {
                task.mark_running();
                task.fail(err);
                return task;
            }
        };

        let spec = CallSpec {
            method,
            url,
            payload: body.map(Payload::Json).unwrap_or(Payload::Empty),
            is_auth: false,
            timeout: options.timeout.unwrap_or(self.inner.config.timeout),
            retry: options
                .retry
                .unwrap_or_else(|| self.inner.config.retry.clone()),
        };

        let run: RunFn = {
            let inner = self.inner.clone();
            let task = task.clone();
            Box::new(move || -> BoxFuture<'static, ()> {
                Box::pin(inner.execute_api::<T>(task, spec))
            })
        };
        let fail: FailFn = {
            let task = task.clone();
            Box::new(move |err| task.fail(err))
        };
        self.inner.main.submit(QueuedCall { run, fail });
        task
    }

    /// Exchange user credentials for a session.
    pub fn authenticate_with_user_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> RequestTask<()> {
        let form = self
            .inner
            .auth_form("password", &[("username", username), ("password", password)]);
        self.inner.submit_auth_exchange(form)
    }

    /// Exchange app credentials for a session.
    pub fn authenticate_with_app_credentials(&self, app_id: &str, app_token: &str) -> RequestTask<()> {
        let form = self
            .inner
            .auth_form("app", &[("app_id", app_id), ("app_token", app_token)]);
        self.inner.submit_auth_exchange(form)
    }

    /// Exchange a transfer token for a session.
    pub fn authenticate_with_transfer_token(&self, transfer_token: &str) -> RequestTask<()> {
        let form = self
            .inner
            .auth_form("transfer_token", &[("transfer_token", transfer_token)]);
        self.inner.submit_auth_exchange(form)
    }
}

impl ClientInner {
    fn auth_form(&self, grant_type: &str, fields: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut form = vec![("grant_type".to_string(), grant_type.to_string())];
        for (key, value) in fields {
            form.push((key.to_string(), value.to_string()));
        }
        if let Some(api_key) = &self.config.api_key {
            form.push(("client_id".to_string(), api_key.clone()));
        }
        if let Some(api_secret) = &self.config.api_secret {
            form.push(("client_secret".to_string(), api_secret.clone()));
        }
        form
    }

    fn submit_auth_exchange(self: &Arc<Self>, form: Vec<(String, String)>) -> RequestTask<()> {
        self.submit_auth(CallSpec {
            method: Method::POST,
            url: self.auth_url.clone(),
            payload: Payload::Form(form),
            is_auth: true,
            timeout: self.config.auth_timeout,
            retry: RetryConfig::none(),
        })
    }

    fn submit_auth(self: &Arc<Self>, spec: CallSpec) -> RequestTask<()> {
        let task: RequestTask<()> =
            RequestTask::new(self.delivery.clone(), self.globals.clone(), true);
        let run: RunFn = {
            let inner = self.clone();
            let task = task.clone();
            Box::new(move || -> BoxFuture<'static, ()> {
                Box::pin(inner.execute_auth(task, spec))
            })
        };
        let fail: FailFn = {
            let task = task.clone();
            Box::new(move |err| task.fail(err))
        };
        self.refresh.submit(QueuedCall { run, fail });
        task
    }

    async fn execute_api<T>(self: Arc<Self>, task: RequestTask<T>, spec: CallSpec)
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        if !task.mark_running() {
            debug!(url = %spec.url, "skipping cancelled request");
            return;
        }
        // The token in effect now decides whether a later 401 is ours to
        // repair or someone else already did.
        let token_at_send = self.session.access_token();
        match self.perform(&spec).await {
            Ok(body) => Self::finish(&task, &body),
            Err(err) if err.is_auth_error() => {
                self.recover_auth(task, spec, token_at_send, err).await;
            }
            Err(err) => task.fail(err),
        }
    }

    async fn execute_auth(self: Arc<Self>, task: RequestTask<()>, spec: CallSpec) {
        if !task.mark_running() {
            return;
        }
        match self.perform(&spec).await {
            Ok(body) => match self.session.set_from_json(&body) {
                Ok(session) => {
                    debug!("auth exchange complete");
                    task.deliver_session(session);
                    task.succeed(());
                }
                Err(err) => task.fail(err),
            },
            Err(err) => {
                warn!("auth exchange failed: {err}");
                task.fail(err);
            }
        }
    }

    /// The auth-retry policy. Runs on the main queue worker, so ordinary
    /// traffic is implicitly held while it waits; the refresh exchange
    /// runs on the other queue.
    async fn recover_auth<T>(
        self: Arc<Self>,
        task: RequestTask<T>,
        spec: CallSpec,
        token_at_send: Option<String>,
        err: ClientError,
    ) where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        // Token already rotated by another exchange: this failure belongs
        // to a superseded session, surface it untouched.
        if self.session.access_token() != token_at_send {
            debug!("auth failure for a superseded token, surfacing as-is");
            task.fail(err);
            return;
        }

        let refresh_token = match self.session.refresh_token() {
            Some(token) => token,
            None => {
                task.fail(err);
                return;
            }
        };

        debug!("session expired, exchanging refresh token");
        self.main.pause();
        let exchange = self.submit_refresh_exchange(&refresh_token);
        let wait = self.config.auth_timeout + REFRESH_WAIT_MARGIN;

        match exchange.wait_timeout(wait).await {
            Some(TaskState::Succeeded) => {
                self.main.resume();
                debug!("session refreshed, replaying original request");
                match self.perform(&spec).await {
                    Ok(body) => Self::finish(&task, &body),
                    Err(err) => task.fail(err),
                }
            }
            _ => {
                let failure = exchange
                    .error()
                    .map(|err| (*err).clone())
                    .unwrap_or(ClientError::NoResponse);
                warn!("session refresh failed, failing queued requests: {failure}");
                for queued in self.main.drain() {
                    (queued.fail)(failure.clone());
                }
                task.fail(failure);
                self.main.resume();
            }
        }
    }

    fn submit_refresh_exchange(self: &Arc<Self>, refresh_token: &str) -> RequestTask<()> {
        let form = self.auth_form("refresh_token", &[("refresh_token", refresh_token)]);
        self.submit_auth_exchange(form)
    }

    async fn perform(&self, spec: &CallSpec) -> Result<String> {
        let mut attempt: u32 = 0;
        loop {
            match self.send_once(spec).await {
                Ok(body) => {
                    if attempt > 0 {
                        debug!("request succeeded after {attempt} retries");
                    }
                    return Ok(body);
                }
                Err(err) if err.is_retryable() && attempt < spec.retry.max_attempts => {
                    let delay = spec.retry.delay_for(attempt);
                    warn!(
                        "request failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        spec.retry.max_attempts,
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(&self, spec: &CallSpec) -> Result<String> {
        let mut request = self
            .http
            .request(spec.method.clone(), spec.url.clone())
            .timeout(spec.timeout)
            .header("X-Time-Zone", &self.config.time_zone);

        request = match &spec.payload {
            Payload::Empty => request.header(
                reqwest::header::CONTENT_TYPE,
                "application/json; charset=UTF-8",
            ),
            Payload::Json(body) => request.json(body),
            Payload::Form(fields) => request.form(fields),
        };

        // Stamped at send time, not submission time, so already-queued
        // requests pick up a freshly refreshed token.
        if !spec.is_auth {
            if let Some(token) = self.session.access_token() {
                request = request.bearer_auth(token);
            }
        }

        debug!(method = %spec.method, url = %spec.url, "dispatching");
        let response = request.send().await.map_err(ClientError::from_transport)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(ClientError::from_transport)?;

        if (200..300).contains(&status) {
            Ok(body)
        } else {
            Err(ClientError::from_error_body(status, body))
        }
    }

    fn finish<T>(task: &RequestTask<T>, body: &str)
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        match decode::<T>(body) {
            Ok(value) => task.succeed(value),
            Err(err) => task.fail(err),
        }
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    let body = body.trim();
    if body.is_empty() {
        // Empty bodies (e.g. DELETE responses) decode as JSON null.
        serde_json::from_value(serde_json::Value::Null)
            .map_err(|err| ClientError::Decode(err.to_string()))
    } else {
        serde_json::from_str(body).map_err(|err| ClientError::Decode(err.to_string()))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.config.base_url)
            .finish_non_exhaustive()
    }
}
