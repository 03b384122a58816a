//! HTTP transport for the client-server API.
//!
//! Every call goes through [`HttpTransport::make_request`]: JSON in, JSON
//! out, bearer auth when an access token is set. Non-2xx responses become
//! [`HttpError`] with the protocol error decoded when possible.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Method, Url};
use roomsync_types::{
    ApiError, CreateFilterResponse, CreateRoomRequest, CreateRoomResponse, JoinedRoomsResponse,
    LoginRequest, LoginResponse, MessagesResponse, RedactRequest, RegisterRequest,
    RegisterResponse, SendEventResponse, SyncRequest, SyncResponse, TextMessage, TypingRequest,
    UserInteractiveResponse, VersionsResponse, EVENT_MESSAGE,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::{HttpError, Transport, TransportError};
use crate::config::{ClientConfig, DEFAULT_PREFIX};

const LOGIN_DUMMY: &str = "m.login.dummy";

/// Slack on top of the long-poll timeout before a request is abandoned.
pub const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(30);

/// Whole-request timeout for a client long-polling for `sync_timeout_ms`.
///
/// Bounds the wait on a connection that died without closing, so the failure
/// policy gets to run.
pub fn request_timeout(sync_timeout_ms: u64) -> Duration {
    Duration::from_millis(sync_timeout_ms) + REQUEST_TIMEOUT_MARGIN
}

/// Outcome of a registration attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterOutcome {
    /// The account was created.
    Registered(RegisterResponse),
    /// The server wants user-interactive authentication first.
    NeedsAuth(UserInteractiveResponse),
}

#[derive(Default)]
struct Credentials {
    user_id: String,
    access_token: String,
}

/// [`Transport`] over HTTPS using `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    homeserver: Url,
    prefix: String,
    app_service_user_id: Option<String>,
    credentials: RwLock<Credentials>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("homeserver", &self.homeserver.as_str())
            .field("prefix", &self.prefix)
            .field("user_id", &self.user_id())
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Create a transport for `homeserver_url` acting as `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if the URL does not parse or is
    /// not http(s).
    pub fn new(
        homeserver_url: &str,
        user_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let homeserver = Url::parse(homeserver_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{homeserver_url}: {e}")))?;
        if !matches!(homeserver.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUrl(format!(
                "{homeserver_url}: scheme must be http or https"
            )));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            homeserver,
            prefix: DEFAULT_PREFIX.to_string(),
            app_service_user_id: None,
            credentials: RwLock::new(Credentials {
                user_id: user_id.into(),
                access_token: access_token.into(),
            }),
        })
    }

    /// Create a transport from a loaded configuration.
    ///
    /// Requests time out [`REQUEST_TIMEOUT_MARGIN`] after the configured
    /// long-poll timeout.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout(config.sync_timeout_ms))
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let mut transport = Self::new(
            &config.homeserver_url,
            config.user_id.clone(),
            config.access_token.clone(),
        )?
        .with_prefix(config.prefix.clone())
        .with_client(client);
        transport.app_service_user_id = config.app_service_user_id.clone();
        Ok(transport)
    }

    /// Set the API path prefix (default `/_matrix/client/r0`).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Act as `user_id` on behalf of an application service.
    pub fn with_app_service_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.app_service_user_id = Some(user_id.into());
        self
    }

    /// Use a preconfigured `reqwest` client (timeouts, proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Replace the user ID and access token.
    pub fn set_credentials(&self, user_id: impl Into<String>, access_token: impl Into<String>) {
        let mut credentials = self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        credentials.user_id = user_id.into();
        credentials.access_token = access_token.into();
    }

    /// Forget the user ID and access token.
    pub fn clear_credentials(&self) {
        *self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Credentials::default();
    }

    /// The user ID requests are made as.
    pub fn user_id(&self) -> String {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .user_id
            .clone()
    }

    fn access_token(&self) -> String {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token
            .clone()
    }

    // ===========================================
    // URL building
    // ===========================================

    /// URL for `path` under the API prefix.
    pub fn build_url(&self, path: &[&str]) -> Result<Url, TransportError> {
        let mut full = Vec::with_capacity(path.len() + 1);
        full.push(self.prefix.as_str());
        full.extend_from_slice(path);
        self.build_base_url(&full)
    }

    /// URL for `path` directly under the homeserver; include any prefix
    /// yourself.
    ///
    /// Parts may contain `/`; a trailing `/` on the last part is kept.
    pub fn build_base_url(&self, path: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.homeserver.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                TransportError::InvalidUrl(format!("{} cannot be a base", self.homeserver))
            })?;
            segments.pop_if_empty();
            for part in path {
                segments.extend(part.split('/').filter(|s| !s.is_empty()));
            }
            if path.last().is_some_and(|last| last.ends_with('/')) {
                segments.push("");
            }
        }
        if let Some(user_id) = &self.app_service_user_id {
            url.query_pairs_mut().append_pair("user_id", user_id);
        }
        Ok(url)
    }

    /// [`build_url`](Self::build_url) with query parameters appended.
    pub fn build_url_with_query<K, V>(
        &self,
        path: &[&str],
        query: &[(K, V)],
    ) -> Result<Url, TransportError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut url = self.build_url(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key.as_ref(), value.as_ref());
            }
        }
        Ok(url)
    }

    // ===========================================
    // Request plumbing
    // ===========================================

    /// Send a JSON request and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Non-2xx responses return [`TransportError::Http`].
    pub async fn make_request<B, R>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<R, TransportError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let contents = self.execute(method, url, body).await?;
        serde_json::from_str(&contents).map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// Send a JSON request and return the raw response body.
    async fn execute<B>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<String, TransportError>
    where
        B: Serialize + ?Sized,
    {
        debug!(method = %method, path = url.path(), "homeserver request");
        let path = url.path().to_string();

        let mut request = self
            .client
            .request(method.clone(), url)
            .header(header::CONTENT_TYPE, "application/json");
        let token = self.access_token();
        if !token.is_empty() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            let bytes =
                serde_json::to_vec(body).map_err(|e| TransportError::Request(e.to_string()))?;
            request = request.body(bytes);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status();
        let contents = response
            .text()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !status.is_success() {
            debug!(method = %method, path = %path, status = status.as_u16(), "homeserver error");
            return Err(http_error(&method, &path, status.as_u16(), contents).into());
        }
        Ok(contents)
    }

    // ===========================================
    // Discovery and authentication
    // ===========================================

    /// Protocol versions supported by the server.
    pub async fn versions(&self) -> Result<VersionsResponse, TransportError> {
        let url = self.build_base_url(&["_matrix", "client", "versions"])?;
        self.make_request::<(), _>(Method::GET, url, None).await
    }

    /// Password or token login. Does not change this transport's credentials;
    /// see [`set_credentials`](Self::set_credentials).
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, TransportError> {
        let url = self.build_url(&["login"])?;
        self.make_request(Method::POST, url, Some(request)).await
    }

    /// Invalidate the current access token.
    pub async fn logout(&self) -> Result<(), TransportError> {
        let url = self.build_url(&["logout"])?;
        self.execute::<()>(Method::POST, url, None).await?;
        Ok(())
    }

    /// Invalidate every access token of the user.
    pub async fn logout_all(&self) -> Result<(), TransportError> {
        let url = self.build_url(&["logout/all"])?;
        self.execute::<()>(Method::POST, url, None).await?;
        Ok(())
    }

    /// Register a user account.
    ///
    /// A 401 carrying a user-interactive auth body is returned as
    /// [`RegisterOutcome::NeedsAuth`], not as an error.
    pub async fn register(
        &self,
        request: &RegisterRequest,
    ) -> Result<RegisterOutcome, TransportError> {
        let url = self.build_url(&["register"])?;
        self.register_at(url, request).await
    }

    /// Register a guest account.
    pub async fn register_guest(
        &self,
        request: &RegisterRequest,
    ) -> Result<RegisterOutcome, TransportError> {
        let url = self.build_url_with_query(&["register"], &[("kind", "guest")])?;
        self.register_at(url, request).await
    }

    /// Register using the `m.login.dummy` flow.
    ///
    /// If the server asks for interactive auth and offers a single-stage dummy
    /// flow, the request is retried once with that stage. Does not change
    /// this transport's credentials.
    pub async fn register_dummy(
        &self,
        request: &RegisterRequest,
    ) -> Result<RegisterResponse, TransportError> {
        let uia = match self.register(request).await? {
            RegisterOutcome::Registered(response) => return Ok(response),
            RegisterOutcome::NeedsAuth(uia) => uia,
        };
        if uia.has_single_stage_flow(LOGIN_DUMMY) {
            let mut auth = serde_json::Map::new();
            auth.insert("type".into(), LOGIN_DUMMY.into());
            if !uia.session.is_empty() {
                auth.insert("session".into(), uia.session.clone().into());
            }
            let mut retry = request.clone();
            retry.auth = Some(auth.into());
            if let RegisterOutcome::Registered(response) = self.register(&retry).await? {
                return Ok(response);
            }
        }
        Err(TransportError::Request(
            "registration failed: does this server support m.login.dummy?".to_string(),
        ))
    }

    async fn register_at(
        &self,
        url: Url,
        request: &RegisterRequest,
    ) -> Result<RegisterOutcome, TransportError> {
        match self.make_request(Method::POST, url, Some(request)).await {
            Ok(response) => Ok(RegisterOutcome::Registered(response)),
            Err(TransportError::Http(err)) if err.code == 401 => {
                serde_json::from_str(&err.contents)
                    .map(RegisterOutcome::NeedsAuth)
                    .map_err(|e| TransportError::Decode(e.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    // ===========================================
    // Sync
    // ===========================================

    /// Upload a filter for the current user.
    pub async fn create_filter_for(
        &self,
        user_id: &str,
        definition: &serde_json::Value,
    ) -> Result<CreateFilterResponse, TransportError> {
        let url = self.build_url(&["user", user_id, "filter"])?;
        self.make_request(Method::POST, url, Some(definition)).await
    }

    /// One `/sync` request.
    pub async fn sync_request(&self, request: &SyncRequest) -> Result<SyncResponse, TransportError> {
        let url = self.build_url_with_query(&["sync"], &request.query_pairs())?;
        self.make_request::<(), _>(Method::GET, url, None).await
    }

    // ===========================================
    // Sending
    // ===========================================

    /// Send a message event. A fresh transaction ID is used for every call.
    pub async fn send_message_event<C>(
        &self,
        room_id: &str,
        event_type: &str,
        content: &C,
    ) -> Result<SendEventResponse, TransportError>
    where
        C: Serialize + ?Sized,
    {
        let txn_id = transaction_id();
        let url = self.build_url(&["rooms", room_id, "send", event_type, &txn_id])?;
        self.make_request(Method::PUT, url, Some(content)).await
    }

    /// Send a state event.
    pub async fn send_state_event<C>(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
        content: &C,
    ) -> Result<SendEventResponse, TransportError>
    where
        C: Serialize + ?Sized,
    {
        let url = self.build_url(&["rooms", room_id, "state", event_type, state_key])?;
        self.make_request(Method::PUT, url, Some(content)).await
    }

    /// Send an `m.text` message.
    pub async fn send_text(&self, room_id: &str, text: &str) -> Result<SendEventResponse, TransportError> {
        self.send_message_event(room_id, EVENT_MESSAGE, &TextMessage::text(text))
            .await
    }

    /// Send an `m.notice` message.
    pub async fn send_notice(
        &self,
        room_id: &str,
        text: &str,
    ) -> Result<SendEventResponse, TransportError> {
        self.send_message_event(room_id, EVENT_MESSAGE, &TextMessage::notice(text))
            .await
    }

    /// Send an `m.text` message with an HTML body.
    pub async fn send_formatted_text(
        &self,
        room_id: &str,
        text: &str,
        formatted: &str,
    ) -> Result<SendEventResponse, TransportError> {
        self.send_message_event(room_id, EVENT_MESSAGE, &TextMessage::html(text, formatted))
            .await
    }

    /// Redact an event.
    pub async fn redact_event(
        &self,
        room_id: &str,
        event_id: &str,
        request: &RedactRequest,
    ) -> Result<SendEventResponse, TransportError> {
        let txn_id = transaction_id();
        let url = self.build_url(&["rooms", room_id, "redact", event_id, &txn_id])?;
        self.make_request(Method::PUT, url, Some(request)).await
    }

    /// Send a read receipt for `event_id`.
    pub async fn mark_read(&self, room_id: &str, event_id: &str) -> Result<(), TransportError> {
        let url = self.build_url(&["rooms", room_id, "receipt", "m.read", event_id])?;
        self.execute::<()>(Method::POST, url, None).await?;
        Ok(())
    }

    /// Tell the room whether the current user is typing.
    pub async fn user_typing(
        &self,
        room_id: &str,
        typing: bool,
        timeout_ms: u64,
    ) -> Result<(), TransportError> {
        let user_id = self.user_id();
        let url = self.build_url(&["rooms", room_id, "typing", &user_id])?;
        let request = TypingRequest {
            typing,
            timeout: timeout_ms,
        };
        self.execute(Method::PUT, url, Some(&request)).await?;
        Ok(())
    }

    // ===========================================
    // Rooms
    // ===========================================

    /// Create a room.
    pub async fn create_room(
        &self,
        request: &CreateRoomRequest,
    ) -> Result<CreateRoomResponse, TransportError> {
        let url = self.build_url(&["createRoom"])?;
        self.make_request(Method::POST, url, Some(request)).await
    }

    /// Fetch the content of one state event.
    pub async fn state_event<R>(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
    ) -> Result<R, TransportError>
    where
        R: DeserializeOwned,
    {
        let url = self.build_url(&["rooms", room_id, "state", event_type, state_key])?;
        self.make_request::<(), _>(Method::GET, url, None).await
    }

    /// Page through room history. `dir` is `'b'` (backwards) or `'f'`.
    /// `to` and `limit` are omitted when empty or zero.
    pub async fn messages(
        &self,
        room_id: &str,
        from: &str,
        to: &str,
        dir: char,
        limit: u32,
    ) -> Result<MessagesResponse, TransportError> {
        let mut query = vec![("from", from.to_string()), ("dir", dir.to_string())];
        if !to.is_empty() {
            query.push(("to", to.to_string()));
        }
        if limit != 0 {
            query.push(("limit", limit.to_string()));
        }
        let url = self.build_url_with_query(&["rooms", room_id, "messages"], &query)?;
        self.make_request::<(), _>(Method::GET, url, None).await
    }

    /// Rooms the current user is joined to.
    pub async fn joined_rooms(&self) -> Result<JoinedRoomsResponse, TransportError> {
        let url = self.build_url(&["joined_rooms"])?;
        self.make_request::<(), _>(Method::GET, url, None).await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn sync(&self, request: &SyncRequest) -> Result<SyncResponse, TransportError> {
        self.sync_request(request).await
    }

    async fn create_filter(
        &self,
        user_id: &str,
        definition: &serde_json::Value,
    ) -> Result<String, TransportError> {
        Ok(self.create_filter_for(user_id, definition).await?.filter_id)
    }
}

fn transaction_id() -> String {
    format!("rs{}", Uuid::new_v4().simple())
}

/// Build the error for a non-2xx response.
///
/// The body is kept in `message` when it is not a protocol error, so proxy
/// error pages are not lost.
fn http_error(method: &Method, path: &str, code: u16, contents: String) -> HttpError {
    let api_error = serde_json::from_str::<ApiError>(&contents)
        .ok()
        .filter(|e| !e.code.is_empty());
    let detail = api_error
        .as_ref()
        .map_or_else(|| contents.clone(), ToString::to_string);
    HttpError {
        code,
        message: format!("failed to {method} JSON to {path}: {detail}"),
        contents,
        api_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> HttpTransport {
        HttpTransport::new("https://hs.example.org", "@me:example.org", "token").unwrap()
    }

    // ===========================================
    // Construction Tests
    // ===========================================

    #[test]
    fn rejects_unparseable_url() {
        assert!(matches!(
            HttpTransport::new("not a url", "@me:x", ""),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(matches!(
            HttpTransport::new("ftp://hs.example.org", "@me:x", ""),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn from_config_applies_prefix_and_app_service() {
        let config = ClientConfig {
            homeserver_url: "https://hs.example.org".into(),
            user_id: "@bot:example.org".into(),
            access_token: "t".into(),
            prefix: "/_matrix/client/v3".into(),
            sync_timeout_ms: 30_000,
            app_service_user_id: Some("@as:example.org".into()),
        };
        let transport = HttpTransport::from_config(&config).unwrap();
        let url = transport.build_url(&["sync"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://hs.example.org/_matrix/client/v3/sync?user_id=%40as%3Aexample.org"
        );
    }

    #[test]
    fn credentials_can_be_replaced_and_cleared() {
        let transport = transport();
        transport.set_credentials("@other:x", "t2");
        assert_eq!(transport.user_id(), "@other:x");
        assert_eq!(transport.access_token(), "t2");

        transport.clear_credentials();
        assert_eq!(transport.user_id(), "");
        assert_eq!(transport.access_token(), "");
    }

    // ===========================================
    // URL Building Tests
    // ===========================================

    #[test]
    fn build_url_adds_prefix() {
        let url = transport().build_url(&["joined_rooms"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://hs.example.org/_matrix/client/r0/joined_rooms"
        );
    }

    #[test]
    fn build_url_splits_parts_with_slashes() {
        let url = transport().build_url(&["logout/all"]).unwrap();
        assert_eq!(url.path(), "/_matrix/client/r0/logout/all");
    }

    #[test]
    fn build_url_keeps_explicit_trailing_slash() {
        let url = transport().build_url(&["pushrules/"]).unwrap();
        assert_eq!(url.path(), "/_matrix/client/r0/pushrules/");
    }

    #[test]
    fn build_base_url_keeps_homeserver_path() {
        let transport =
            HttpTransport::new("https://example.org/matrix/", "@me:x", "").unwrap();
        let url = transport
            .build_base_url(&["_matrix", "client", "versions"])
            .unwrap();
        assert_eq!(url.path(), "/matrix/_matrix/client/versions");
        assert_eq!(url.query(), None);
    }

    #[test]
    fn sync_query_is_appended_in_order() {
        let request = SyncRequest::new(30_000, "s72", "f1");
        let url = transport()
            .build_url_with_query(&["sync"], &request.query_pairs())
            .unwrap();
        assert_eq!(url.query(), Some("timeout=30000&since=s72&filter=f1"));
    }

    #[test]
    fn app_service_user_id_comes_before_query() {
        let transport = transport().with_app_service_user_id("@as:x");
        let url = transport
            .build_url_with_query(&["register"], &[("kind", "guest")])
            .unwrap();
        assert_eq!(url.query(), Some("user_id=%40as%3Ax&kind=guest"));
    }

    #[test]
    fn transaction_ids_are_unique() {
        let first = transaction_id();
        let second = transaction_id();
        assert_ne!(first, second);
        assert!(first.starts_with("rs"));
    }

    // ===========================================
    // Error Decoding Tests
    // ===========================================

    #[test]
    fn decodes_protocol_error() {
        let err = http_error(
            &Method::GET,
            "/_matrix/client/r0/sync",
            403,
            r#"{"errcode":"M_FORBIDDEN","error":"nope"}"#.to_string(),
        );
        assert_eq!(err.code, 403);
        assert_eq!(err.errcode(), Some("M_FORBIDDEN"));
        assert_eq!(
            err.message,
            "failed to GET JSON to /_matrix/client/r0/sync: M_FORBIDDEN: nope"
        );
    }

    #[test]
    fn keeps_raw_body_when_not_protocol_error() {
        let body = "<html>502 Bad Gateway</html>".to_string();
        let err = http_error(&Method::PUT, "/x", 502, body.clone());
        assert_eq!(err.api_error, None);
        assert_eq!(err.contents, body);
        assert!(err.message.ends_with(&body));
        assert!(err.message.starts_with("failed to PUT JSON to /x"));
    }

    #[test]
    fn json_without_errcode_is_not_protocol_error() {
        let err = http_error(&Method::POST, "/x", 500, r#"{"error":"boom"}"#.to_string());
        assert_eq!(err.api_error, None);
        assert!(err.message.contains(r#"{"error":"boom"}"#));
    }

    #[test]
    fn request_timeout_leaves_room_for_long_poll() {
        assert_eq!(request_timeout(30_000), Duration::from_secs(60));
        assert_eq!(request_timeout(0), REQUEST_TIMEOUT_MARGIN);
    }

    // ===========================================
    // Homeserver Round-Trip Tests
    // ===========================================

    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// A request as seen by [`FakeHomeserver`].
    #[derive(Debug)]
    struct SeenRequest {
        method: String,
        path: String,
        authorization: Option<String>,
        body: String,
    }

    impl SeenRequest {
        fn json(&self) -> serde_json::Value {
            serde_json::from_str(&self.body).unwrap()
        }
    }

    /// Answers one connection per scripted reply, then returns what it saw.
    struct FakeHomeserver {
        url: String,
        handle: JoinHandle<Vec<SeenRequest>>,
    }

    impl FakeHomeserver {
        async fn start(replies: Vec<(u16, &'static str)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let handle = tokio::spawn(async move {
                let mut seen = Vec::new();
                for (status, body) in replies {
                    let (stream, _) = listener.accept().await.unwrap();
                    let mut stream = BufReader::new(stream);
                    seen.push(read_request(&mut stream).await);

                    let response = format!(
                        "HTTP/1.1 {status} Scripted\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let stream = stream.get_mut();
                    stream.write_all(response.as_bytes()).await.unwrap();
                    stream.shutdown().await.unwrap();
                }
                seen
            });
            Self { url, handle }
        }

        fn transport(&self, token: &str) -> HttpTransport {
            HttpTransport::new(&self.url, "@me:x", token).unwrap()
        }

        async fn requests(self) -> Vec<SeenRequest> {
            self.handle.await.unwrap()
        }
    }

    async fn read_request(stream: &mut BufReader<tokio::net::TcpStream>) -> SeenRequest {
        let mut line = String::new();
        stream.read_line(&mut line).await.unwrap();
        let mut parts = line.split_whitespace();
        let method = parts.next().unwrap().to_string();
        let path = parts.next().unwrap().to_string();

        let mut content_length = 0;
        let mut authorization = None;
        loop {
            let mut header = String::new();
            stream.read_line(&mut header).await.unwrap();
            let header = header.trim_end();
            if header.is_empty() {
                break;
            }
            let (name, value) = header.split_once(':').unwrap();
            match name.to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap(),
                "authorization" => authorization = Some(value.trim().to_string()),
                _ => {}
            }
        }

        let mut body = vec![0; content_length];
        stream.read_exact(&mut body).await.unwrap();
        SeenRequest {
            method,
            path,
            authorization,
            body: String::from_utf8(body).unwrap(),
        }
    }

    const DUMMY_CHALLENGE: &str =
        r#"{"flows":[{"stages":["m.login.dummy"]}],"session":"abc","params":{}}"#;

    #[tokio::test]
    async fn register_dummy_retries_with_session() {
        let server = FakeHomeserver::start(vec![
            (401, DUMMY_CHALLENGE),
            (200, r#"{"user_id":"@new:x","access_token":"tok","device_id":"D1"}"#),
        ])
        .await;
        let transport = server.transport("");
        let request = RegisterRequest {
            username: "new".into(),
            password: "pw".into(),
            ..Default::default()
        };

        let response = transport.register_dummy(&request).await.unwrap();
        assert_eq!(response.access_token, "tok");
        assert_eq!(response.device_id, "D1");

        let seen = server.requests().await;
        assert_eq!(seen.len(), 2);
        for request in &seen {
            assert_eq!(request.method, "POST");
            assert_eq!(request.path, "/_matrix/client/r0/register");
            assert_eq!(request.authorization, None);
        }
        assert!(seen[0].json().get("auth").is_none());
        let retry = seen[1].json();
        assert_eq!(retry["username"], "new");
        assert_eq!(
            retry["auth"],
            serde_json::json!({ "type": "m.login.dummy", "session": "abc" })
        );
    }

    #[tokio::test]
    async fn register_without_dummy_flow_fails() {
        let server = FakeHomeserver::start(vec![(
            401,
            r#"{"flows":[{"stages":["m.login.recaptcha","m.login.dummy"]}],"session":"s"}"#,
        )])
        .await;
        let transport = server.transport("");

        let err = transport
            .register_dummy(&RegisterRequest::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Request(
                "registration failed: does this server support m.login.dummy?".into()
            )
        );
        assert_eq!(server.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn register_surfaces_interactive_auth() {
        let server = FakeHomeserver::start(vec![(401, DUMMY_CHALLENGE)]).await;
        let transport = server.transport("");

        match transport.register(&RegisterRequest::default()).await.unwrap() {
            RegisterOutcome::NeedsAuth(uia) => {
                assert_eq!(uia.session, "abc");
                assert!(uia.has_single_stage_flow("m.login.dummy"));
            }
            other => panic!("expected NeedsAuth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sends_bearer_token_and_decodes_response() {
        let server =
            FakeHomeserver::start(vec![(200, r#"{"joined_rooms":["!a:x","!b:x"]}"#)]).await;
        let transport = server.transport("secret");

        let response = transport.joined_rooms().await.unwrap();
        assert_eq!(response.joined_rooms, vec!["!a:x", "!b:x"]);

        let seen = server.requests().await;
        assert_eq!(seen[0].method, "GET");
        assert_eq!(seen[0].path, "/_matrix/client/r0/joined_rooms");
        assert_eq!(seen[0].authorization.as_deref(), Some("Bearer secret"));
    }

    #[tokio::test]
    async fn error_status_decodes_protocol_error() {
        let server =
            FakeHomeserver::start(vec![(403, r#"{"errcode":"M_FORBIDDEN","error":"nope"}"#)])
                .await;
        let transport = server.transport("secret");

        let err = match transport.joined_rooms().await {
            Err(TransportError::Http(err)) => err,
            other => panic!("expected an HTTP error, got {other:?}"),
        };
        assert_eq!(err.code, 403);
        assert_eq!(err.errcode(), Some("M_FORBIDDEN"));
        assert_eq!(
            err.to_string(),
            "HTTP 403: failed to GET JSON to /_matrix/client/r0/joined_rooms: M_FORBIDDEN: nope"
        );
    }

    #[tokio::test]
    async fn cleared_credentials_send_no_token() {
        let server = FakeHomeserver::start(vec![(200, r#"{"joined_rooms":[]}"#)]).await;
        let transport = server.transport("secret");
        transport.clear_credentials();

        transport.joined_rooms().await.unwrap();
        assert_eq!(server.requests().await[0].authorization, None);
    }
}
