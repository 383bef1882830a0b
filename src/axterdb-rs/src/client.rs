use crate::{AdminClient, ClientError, Result};
use axterdb_core::{
    error_message, ClientConfig, Envelope, MeDetail, Row, RowValues, RowsDetail, TableSchema,
    TablesDetail,
};
use chrono::{DateTime, Utc};
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument, Span};

const KEY_HEADER: &str = "KEY";
const TABLE_HEADER: &str = "table";
const AMOUNT_HEADER: &str = "amount";

/// Lifecycle of a [`Client`] as seen from the outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Live transport plus what was learned while connecting
struct Session {
    http: HttpClient,
    latency: Duration,
    connected_at: DateTime<Utc>,
    admin: Option<bool>,
}

enum SessionState {
    Disconnected,
    Connecting,
    Connected(Session),
}

impl SessionState {
    fn public(&self) -> ConnectionState {
        match self {
            SessionState::Disconnected => ConnectionState::Disconnected,
            SessionState::Connecting => ConnectionState::Connecting,
            SessionState::Connected(_) => ConnectionState::Connected,
        }
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Puts the session back to `Disconnected` unless the attempt finished,
/// including when the `connect()` future is dropped midway.
struct ConnectAttempt<'a> {
    state: &'a Mutex<SessionState>,
    finished: bool,
}

impl ConnectAttempt<'_> {
    fn finish(mut self, session: Session) {
        *lock(self.state) = SessionState::Connected(session);
        self.finished = true;
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *lock(self.state) = SessionState::Disconnected;
        }
    }
}

/// Builder for [`Client`]
pub struct ClientBuilder {
    config: ClientConfig,
    span: Option<Span>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self { config, span: None }
    }

    /// Show the API key in logs and error messages instead of `[HIDDEN]`
    pub fn show_keys(mut self, show_keys: bool) -> Self {
        self.config.show_keys = show_keys;
        self
    }

    /// Bound every request; requests are unbounded by default
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Span that every event of this session is recorded under
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> Client {
        let config = self.config;
        let span = self.span.unwrap_or_else(|| {
            tracing::info_span!("axterdb.session", db = %config.name, host = %config.host)
        });

        Client {
            config,
            state: Mutex::new(SessionState::Disconnected),
            span,
        }
    }
}

/// AxterDB session client.
///
/// Holds one logical session. [`Client::connect`] validates the instance and
/// the key's access to the configured database; every other operation fails
/// with [`ClientError::NotConnected`] until it has succeeded.
pub struct Client {
    config: ClientConfig,
    state: Mutex<SessionState>,
    span: Span,
}

impl Client {
    pub fn new(name: impl Into<String>, key: impl Into<String>, host: impl Into<String>) -> Self {
        Self::from_config(ClientConfig::new(name, key, host))
    }

    pub fn from_config(config: ClientConfig) -> Self {
        ClientBuilder::new(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Full URL of `path` on the instance
    pub fn route(&self, path: &str) -> String {
        self.config.route(path)
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.state).public()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Round-trip time of the access check performed by `connect()`
    pub fn latency(&self) -> Option<Duration> {
        match &*lock(&self.state) {
            SessionState::Connected(session) => Some(session.latency),
            _ => None,
        }
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        match &*lock(&self.state) {
            SessionState::Connected(session) => Some(session.connected_at),
            _ => None,
        }
    }

    /// Connects to the database, checking the instance and the key's access.
    pub async fn connect(&self) -> Result<()> {
        let attempt = self.begin_connect()?;
        let session = self.establish().instrument(self.span.clone()).await?;
        attempt.finish(session);

        info!(
            parent: &self.span,
            "Connected to {}! (Instance: {} | Key: {})",
            self.config.name,
            self.config.host,
            self.config.displayed_key()
        );
        Ok(())
    }

    fn begin_connect(&self) -> Result<ConnectAttempt<'_>> {
        let mut state = lock(&self.state);
        // A concurrent attempt still in flight counts as connected.
        if !matches!(*state, SessionState::Disconnected) {
            return Err(ClientError::AlreadyConnected {
                host: self.config.host.clone(),
                name: self.config.name.clone(),
                key: self.config.displayed_key().to_string(),
            });
        }

        *state = SessionState::Connecting;
        Ok(ConnectAttempt {
            state: &self.state,
            finished: false,
        })
    }

    async fn establish(&self) -> Result<Session> {
        info!("Connection to database started.");
        let http = self.build_transport()?;
        self.check_instance(&http).await?;
        let (latency, admin) = self.check_access(&http).await?;

        Ok(Session {
            http,
            latency,
            connected_at: Utc::now(),
            admin,
        })
    }

    fn build_transport(&self) -> Result<HttpClient> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = self.config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }

    async fn check_instance(&self, http: &HttpClient) -> Result<()> {
        info!("Checking instance.");
        if self.config.instance_ip().is_none() {
            return Err(ClientError::InvalidInstanceIp {
                host: self.config.host.clone(),
            });
        }

        match http.get(self.route("/")).send().await {
            Ok(response) if response.status() == StatusCode::OK => {}
            Ok(response) => {
                warn!(status = response.status().as_u16(), "Instance probe rejected");
                return Err(self.connection_failure());
            }
            Err(err) => {
                warn!(error = %err, "Instance probe failed");
                return Err(self.connection_failure());
            }
        }

        info!("Instance checked");
        Ok(())
    }

    async fn check_access(&self, http: &HttpClient) -> Result<(Duration, Option<bool>)> {
        info!(
            "Checking access for key {} to {}",
            self.config.displayed_key(),
            self.config.name
        );

        let started = Instant::now();
        let response = http
            .get(self.route("/me"))
            .header(KEY_HEADER, self.config.key.as_str())
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(ClientError::InvalidKey);
        }

        let me: Envelope<MeDetail> = read_json(response).await?;
        let latency = started.elapsed();
        debug!(latency_ms = latency.as_millis() as u64, "Access check answered");

        if !me.detail.data.databases.contains(&self.config.name) {
            return Err(ClientError::NoAccess {
                host: self.config.host.clone(),
                name: self.config.name.clone(),
                key: self.config.displayed_key().to_string(),
            });
        }

        Ok((latency, me.detail.data.admin))
    }

    fn connection_failure(&self) -> ClientError {
        ClientError::ConnectionFailure {
            host: self.config.host.clone(),
            key: self.config.displayed_key().to_string(),
        }
    }

    /// Administrative capability of this session.
    ///
    /// `Ok(None)` when the instance reported that the key is not an admin key.
    /// An instance that does not report the flag at all still gets the
    /// capability; its admin endpoints then decide.
    pub fn admin(&self) -> Result<Option<AdminClient<'_>>> {
        match &*lock(&self.state) {
            SessionState::Connected(session) => Ok(match session.admin {
                Some(false) => None,
                _ => Some(AdminClient::new(self)),
            }),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Closes the session and releases the transport
    pub fn close(self) {
        if self.is_connected() {
            info!(parent: &self.span, "Closing database connection");
        }
        *lock(&self.state) = SessionState::Disconnected;
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    /// Clone the live transport, failing before any I/O when not connected
    pub(crate) fn transport(&self) -> Result<HttpClient> {
        match &*lock(&self.state) {
            SessionState::Connected(session) => Ok(session.http.clone()),
            _ => Err(ClientError::NotConnected),
        }
    }

    pub(crate) fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(KEY_HEADER, self.config.key.as_str())
    }

    fn database_route(&self, action: &str) -> String {
        self.route(&format!("/database/{}/{}", self.config.name, action))
    }

    /// Creates a table on the database.
    ///
    /// Column tags are validated against [`axterdb_core::ColumnType`] before
    /// anything is sent.
    #[tracing::instrument(parent = &self.span, skip(self, columns))]
    pub async fn create_table<I, K, V>(&self, table: &str, columns: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let http = self.transport()?;
        let schema = TableSchema::from_tags(columns)?;

        let response = self
            .authorized(http.post(self.database_route("create")))
            .query(&[("table", table)])
            .json(&schema)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::UNAUTHORIZED => Err(ClientError::InvalidKey),
            StatusCode::CONFLICT => Err(ClientError::TableAlreadyExists(table.to_string())),
            StatusCode::UNPROCESSABLE_ENTITY => {
                let message = server_message(response).await;
                Err(create_table_rejection(message.as_deref()))
            }
            status => Err(ClientError::UnknownError(status.as_u16())),
        }
    }

    /// Get rows from a table.
    ///
    /// `filters` are equality conditions; `amount` caps the number of rows.
    /// Returns an empty list when nothing matches.
    #[tracing::instrument(parent = &self.span, skip(self, filters))]
    pub async fn select(
        &self,
        table: &str,
        amount: Option<usize>,
        filters: &Row,
    ) -> Result<Vec<RowValues>> {
        let http = self.transport()?;

        let mut request = self
            .authorized(http.get(self.database_route("select")))
            .header(TABLE_HEADER, table)
            .json(filters);
        if let Some(amount) = amount {
            request = request.header(AMOUNT_HEADER, amount.to_string());
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::OK => {
                let body: Envelope<RowsDetail> = read_json(response).await?;
                Ok(body.detail.rows)
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                let message = server_message(response).await;
                Err(invalid_column(message.as_deref()))
            }
            status => Err(ClientError::UnknownError(status.as_u16())),
        }
    }

    /// Insert a row into a table
    #[tracing::instrument(parent = &self.span, skip(self, row))]
    pub async fn insert(&self, table: &str, row: &Row) -> Result<()> {
        let http = self.transport()?;

        let response = self
            .authorized(http.get(self.database_route("insert")))
            .header(TABLE_HEADER, table)
            .json(row)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::UNPROCESSABLE_ENTITY => {
                let message = server_message(response).await;
                Err(invalid_column(message.as_deref()))
            }
            status => Err(ClientError::UnknownError(status.as_u16())),
        }
    }

    /// Delete the rows matching `filters`
    #[tracing::instrument(parent = &self.span, skip(self, filters))]
    pub async fn delete(&self, table: &str, filters: &Row) -> Result<()> {
        let http = self.transport()?;

        let response = self
            .authorized(http.get(self.database_route("delete")))
            .header(TABLE_HEADER, table)
            .json(filters)
            .send()
            .await?;

        expect_ok(response.status())
    }

    #[tracing::instrument(parent = &self.span, skip(self))]
    pub async fn delete_table(&self, table: &str) -> Result<()> {
        let http = self.transport()?;

        let response = self
            .authorized(http.get(self.database_route("delete_table")))
            .header(TABLE_HEADER, table)
            .send()
            .await?;

        expect_ok(response.status())
    }

    /// Names of all tables in the database
    #[tracing::instrument(parent = &self.span, skip(self))]
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let http = self.transport()?;

        let response = self
            .authorized(http.get(self.database_route("get")))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: Envelope<TablesDetail> = read_json(response).await?;
                Ok(body.detail.tables)
            }
            StatusCode::UNAUTHORIZED => Err(ClientError::InvalidKey),
            status => Err(ClientError::UnknownError(status.as_u16())),
        }
    }

    #[tracing::instrument(parent = &self.span, skip(self))]
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let http = self.transport()?;

        let response = self
            .authorized(http.get(self.database_route("get")))
            .query(&[("table", table)])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            StatusCode::UNAUTHORIZED => Err(ClientError::InvalidKey),
            status => Err(ClientError::UnknownError(status.as_u16())),
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let Self { state, span, .. } = self;
        let state = state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let SessionState::Connected(_) = state {
            debug!(parent: &*span, "Releasing transport");
        }
        *state = SessionState::Disconnected;
    }
}

pub(crate) fn expect_ok(status: StatusCode) -> Result<()> {
    if status == StatusCode::OK {
        Ok(())
    } else {
        Err(ClientError::UnknownError(status.as_u16()))
    }
}

pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Server message of an error response, if the body carries one
async fn server_message(response: Response) -> Option<String> {
    let body: serde_json::Value = response.json().await.ok()?;
    error_message(&body).map(str::to_owned)
}

// The service only distinguishes these 422s by message text.
fn create_table_rejection(message: Option<&str>) -> ClientError {
    match message {
        Some(message) if message.contains("table") => ClientError::InvalidTable,
        Some(message) if message.contains("rows") => ClientError::InvalidRows,
        _ => ClientError::UnknownError(StatusCode::UNPROCESSABLE_ENTITY.as_u16()),
    }
}

/// The offending column is the first word of the message
fn invalid_column(message: Option<&str>) -> ClientError {
    match message.and_then(|message| message.split_whitespace().next()) {
        Some(column) => ClientError::InvalidColumn(column.to_string()),
        None => ClientError::UnknownError(StatusCode::UNPROCESSABLE_ENTITY.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axterdb_core::ColumnType;

    fn offline_client(host: &str) -> Client {
        Client::new("main", "secret-key", host)
    }

    #[test]
    fn test_create_table_rejection() {
        assert!(matches!(
            create_table_rejection(Some("table is required")),
            ClientError::InvalidTable
        ));
        assert!(matches!(
            create_table_rejection(Some("rows are required")),
            ClientError::InvalidRows
        ));
        assert!(matches!(
            create_table_rejection(Some("something else")),
            ClientError::UnknownError(422)
        ));
        assert!(matches!(
            create_table_rejection(None),
            ClientError::UnknownError(422)
        ));
    }

    #[test]
    fn test_invalid_column_takes_first_word() {
        match invalid_column(Some("colour is not a column in the table")) {
            ClientError::InvalidColumn(column) => assert_eq!(column, "colour"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(invalid_column(Some("  ")), ClientError::UnknownError(422)));
    }

    #[test]
    fn test_expect_ok() {
        assert!(expect_ok(StatusCode::OK).is_ok());
        assert!(matches!(
            expect_ok(StatusCode::INTERNAL_SERVER_ERROR),
            Err(ClientError::UnknownError(500))
        ));
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let client = offline_client("127.0.0.1:9");
        let row = Row::new().with("c1", "x");

        assert!(matches!(
            client.create_table("t", [("c1", ColumnType::Text)]).await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            client.select("t", None, &row).await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(client.insert("t", &row).await, Err(ClientError::NotConnected)));
        assert!(matches!(client.delete("t", &row).await, Err(ClientError::NotConnected)));
        assert!(matches!(client.delete_table("t").await, Err(ClientError::NotConnected)));
        assert!(matches!(client.list_tables().await, Err(ClientError::NotConnected)));
        assert!(matches!(client.table_exists("t").await, Err(ClientError::NotConnected)));
        assert!(matches!(client.admin(), Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_not_connected_wins_over_bad_type() {
        let client = offline_client("127.0.0.1:9");
        let err = client.create_table("t", [("c1", "BAD")]).await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
    }

    #[tokio::test]
    async fn test_connect_rejects_non_ip_host() {
        for host in ["localhost:8000", "db.example.com:80", "not an ip"] {
            let client = offline_client(host);
            match client.connect().await {
                Err(ClientError::InvalidInstanceIp { host: reported }) => assert_eq!(reported, host),
                other => panic!("unexpected result for {host}: {other:?}"),
            }
            assert_eq!(client.state(), ConnectionState::Disconnected);
            assert!(client.latency().is_none());
        }
    }

    #[test]
    fn test_error_messages_hide_key() {
        let client = offline_client("127.0.0.1:9");
        let message = client.connection_failure().to_string();
        assert_eq!(message, "Failed connecting to 127.0.0.1:9 with key [HIDDEN]");

        let shown = Client::builder(ClientConfig::new("main", "secret-key", "127.0.0.1:9"))
            .show_keys(true)
            .build();
        assert!(shown.connection_failure().to_string().contains("secret-key"));
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let client = offline_client("127.0.0.1:9");
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("Disconnected"));
    }

    fn with_session(client: &Client, admin: Option<bool>) {
        *lock(&client.state) = SessionState::Connected(Session {
            http: HttpClient::new(),
            latency: Duration::from_millis(1),
            connected_at: Utc::now(),
            admin,
        });
    }

    #[test]
    fn test_admin_capability_follows_reported_flag() {
        let client = offline_client("127.0.0.1:9");

        with_session(&client, Some(true));
        assert!(client.admin().unwrap().is_some());

        with_session(&client, Some(false));
        assert!(client.admin().unwrap().is_none());

        // Flag not reported
        with_session(&client, None);
        assert!(client.admin().unwrap().is_some());

        drop(client);
    }

    #[test]
    fn test_database_route() {
        let client = offline_client("127.0.0.1:8000");
        assert_eq!(
            client.database_route("select"),
            "http://127.0.0.1:8000/database/main/select"
        );
    }
}
