//! InfluxDB 2.x client.
//!
//! This module provides the main `Client` type for writing line protocol and
//! executing Flux queries against an InfluxDB 2.x server.

use std::pin::Pin;
use std::time::Duration;

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, TryStreamExt};
use log::debug;
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::io::StreamReader;

use crate::error::{Error, Result};
use crate::management::models::{DeletePredicateRequest, HealthCheck, Ready};
use crate::management::{
    AuthorizationsApi, BucketsApi, OrganizationsApi, TasksApi, UsersApi,
};
use crate::parser::{AnnotatedCsvParser, ParseEvent};
use crate::point::Point;
use crate::types::{FluxRecord, FluxTable};
use crate::write::{
    WriteApi, WriteCallbacks, WriteDestination, WriteOptions, deliver_with_retry,
};

/// InfluxDB 2.x client.
///
/// The client executes Flux queries, streaming results record by record so
/// arbitrarily large result sets never have to fit in memory, and writes
/// line protocol either directly or through a batching [`WriteApi`].
///
/// Cloning is cheap; clones share the underlying HTTP connection pool.
///
/// # Example
///
/// ```ignore
/// use influxdb2_client::{Client, Point};
/// use futures::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::new("http://localhost:8086", "my-org", "my-token");
///
///     let point = Point::new("temperature")
///         .tag("location", "office")
///         .field("value", 21.5);
///     client.write("sensors", "my-org", [point]).await?;
///
///     let mut stream = client.query_stream(r#"
///         from(bucket: "sensors")
///         |> range(start: -1h)
///         |> filter(fn: (r) => r._measurement == "temperature")
///     "#).await?;
///
///     while let Some(record) = stream.next().await {
///         let record = record?;
///         println!("Got: {:?}", record);
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    org: String,
    token: String,
    fail_fast: bool,
}

/// Query payload for the InfluxDB API.
#[derive(Debug, Serialize)]
struct QueryPayload {
    query: String,
    #[serde(rename = "type")]
    query_type: String,
    dialect: QueryDialect,
}

/// CSV dialect settings for query responses.
#[derive(Debug, Serialize)]
struct QueryDialect {
    annotations: Vec<String>,
    #[serde(rename = "commentPrefix")]
    comment_prefix: String,
    #[serde(rename = "dateTimeFormat")]
    date_time_format: String,
    delimiter: String,
    header: bool,
}

impl Default for QueryDialect {
    fn default() -> Self {
        Self {
            annotations: vec![
                "datatype".to_string(),
                "group".to_string(),
                "default".to_string(),
            ],
            comment_prefix: "#".to_string(),
            date_time_format: "RFC3339".to_string(),
            delimiter: ",".to_string(),
            header: true,
        }
    }
}

impl QueryPayload {
    fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            query_type: "flux".to_string(),
            dialect: QueryDialect::default(),
        }
    }
}

impl Client {
    /// Create a new InfluxDB client.
    ///
    /// # Arguments
    ///
    /// * `url` - Base URL of the InfluxDB server (e.g., "http://localhost:8086")
    /// * `org` - Organization name
    /// * `token` - Authentication token
    ///
    /// # Panics
    ///
    /// Panics if the provided URL is invalid.
    pub fn new(url: impl Into<String>, org: impl Into<String>, token: impl Into<String>) -> Self {
        let url_str = url.into();
        let base_url = Url::parse(&url_str)
            .unwrap_or_else(|e| panic!("Invalid InfluxDB URL '{}': {}", url_str, e));

        Self {
            http: reqwest::Client::new(),
            base_url,
            org: org.into(),
            token: token.into(),
            fail_fast: false,
        }
    }

    /// Create a new client with a custom reqwest client.
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_http_client(
        http: reqwest::Client,
        url: impl Into<String>,
        org: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let url_str = url.into();
        let base_url = Url::parse(&url_str)
            .unwrap_or_else(|e| panic!("Invalid InfluxDB URL '{}': {}", url_str, e));

        Self {
            http,
            base_url,
            org: org.into(),
            token: token.into(),
            fail_fast: false,
        }
    }

    /// Create a client from `INFLUXDB_V2_*` environment variables.
    ///
    /// Reads `INFLUXDB_V2_URL`, `INFLUXDB_V2_ORG`, `INFLUXDB_V2_TOKEN` and
    /// `INFLUXDB_V2_TIMEOUT` (milliseconds), falling back to
    /// `http://localhost:8086`, `my-org`, `my-token` and 10000.
    ///
    /// # Panics
    ///
    /// Panics if the URL is invalid or the HTTP client cannot be built.
    pub fn from_env() -> Self {
        let url = std::env::var("INFLUXDB_V2_URL")
            .unwrap_or_else(|_| "http://localhost:8086".to_string());
        let org = std::env::var("INFLUXDB_V2_ORG").unwrap_or_else(|_| "my-org".to_string());
        let token = std::env::var("INFLUXDB_V2_TOKEN").unwrap_or_else(|_| "my-token".to_string());
        let timeout_ms = std::env::var("INFLUXDB_V2_TIMEOUT")
            .ok()
            .and_then(|t| t.parse::<u64>().ok())
            .unwrap_or(10_000);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_else(|e| panic!("Failed to build HTTP client: {}", e));

        Self::with_http_client(http, url, org, token)
    }

    /// Stop query parsing at the first cell that fails type conversion.
    ///
    /// Off by default: a bad cell yields one `Err` item in the stream and
    /// parsing resumes with the next row.
    pub fn with_fail_fast_parsing(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Get the base URL.
    pub fn url(&self) -> &Url {
        &self.base_url
    }

    /// Get the organization name.
    pub fn org(&self) -> &str {
        &self.org
    }

    /// Build the full URL for an API endpoint.
    fn endpoint(&self, path: &str) -> String {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url.to_string()
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.token)
    }

    // ------------------------------------------------------------------
    // Query
    // ------------------------------------------------------------------

    async fn send_query(&self, query: String) -> Result<reqwest::Response> {
        let endpoint = self.endpoint("/api/v2/query");
        let payload = QueryPayload::new(query);
        let body = serde_json::to_string(&payload)?;
        debug!("posting flux query to {} ({} bytes)", endpoint, body.len());

        let response = self
            .http
            .request(Method::POST, &endpoint)
            .header("Authorization", self.authorization())
            .header("Accept", "application/csv")
            .header("Content-Type", "application/json")
            .query(&[("org", &self.org)])
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }
        Ok(response)
    }

    /// Execute a Flux query and return results as an async stream.
    ///
    /// This is the primary method for querying InfluxDB. Results are streamed
    /// one record at a time, so you can process arbitrarily large result sets
    /// without running out of memory.
    ///
    /// # Arguments
    ///
    /// * `query` - Flux query string
    ///
    /// # Returns
    ///
    /// A stream of `Result<FluxRecord>`. Each item is either a successfully
    /// parsed record or an error. Unless
    /// [fail-fast parsing](Client::with_fail_fast_parsing) is enabled, the
    /// stream continues past cells that fail type conversion.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use futures::StreamExt;
    ///
    /// let mut stream = client.query_stream("from(bucket: \"test\") |> range(start: -1h)").await?;
    ///
    /// let mut count = 0;
    /// while let Some(result) = stream.next().await {
    ///     let record = result?;
    ///     count += 1;
    /// }
    /// println!("Processed {} records", count);
    /// ```
    pub async fn query_stream(
        &self,
        query: impl Into<String>,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<FluxRecord>> + Send>>> {
        let response = self.send_query(query.into()).await?;

        // Convert the response body to an async reader
        let reader = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));

        let mut parser = AnnotatedCsvParser::new(reader).with_fail_fast(self.fail_fast);

        // Create an async stream that yields records. The parser ends the
        // stream itself after a fatal error, so errors are forwarded without
        // breaking out of the loop here.
        let s = stream! {
            loop {
                match parser.next().await {
                    Ok(Some(record)) => yield Ok(record),
                    Ok(None) => break, // EOF
                    Err(e) => yield Err(e),
                }
            }
        };

        Ok(Box::pin(s))
    }

    /// Execute a Flux query and collect all records into a Vec.
    ///
    /// **Warning**: This loads all results into memory. For large result sets,
    /// use `query_stream()` instead to process records one at a time.
    pub async fn query(&self, query: impl Into<String>) -> Result<Vec<FluxRecord>> {
        let mut stream = self.query_stream(query).await?;
        let mut results = Vec::new();

        while let Some(item) = stream.next().await {
            results.push(item?);
        }

        Ok(results)
    }

    /// Execute a Flux query and collect results grouped into tables.
    ///
    /// Each [`FluxTable`] carries its column metadata (including the group
    /// key) plus all of its records. Tables the server announced without any
    /// matching rows appear with an empty record list.
    ///
    /// **Warning**: This loads all results into memory.
    pub async fn query_tables(&self, query: impl Into<String>) -> Result<Vec<FluxTable>> {
        let response = self.send_query(query.into()).await?;
        let reader = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
        let mut parser = AnnotatedCsvParser::new(reader).with_fail_fast(self.fail_fast);

        let mut tables: Vec<FluxTable> = Vec::new();
        while let Some(event) = parser.next_event().await? {
            match event {
                ParseEvent::TableStart(metadata) => tables.push(FluxTable::new(&metadata)),
                ParseEvent::Record(record) => {
                    if let Some(table) = tables.last_mut() {
                        table.records.push(record);
                    }
                }
            }
        }
        Ok(tables)
    }

    /// Execute a Flux query and return the raw annotated CSV response.
    pub async fn query_raw(&self, query: impl Into<String>) -> Result<String> {
        let response = self.send_query(query.into()).await?;
        Ok(response.text().await?)
    }

    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Write points synchronously, with a single delivery attempt.
    ///
    /// Returns once the server has accepted the batch. Any failure, including
    /// ones that would be retried by the background pipeline, surfaces as an
    /// error; use [`write_with_options`](Client::write_with_options) to retry,
    /// or a [`WriteApi`] for batched background writes.
    pub async fn write(
        &self,
        bucket: &str,
        org: &str,
        points: impl IntoIterator<Item = Point>,
    ) -> Result<()> {
        let options = WriteOptions::default().with_max_retries(0);
        self.write_with_options(bucket, org, &options, points).await
    }

    /// Write points synchronously with explicit precision and retry settings.
    ///
    /// Retryable failures (connection errors, `429`, `5xx`) are retried per
    /// the options' backoff schedule before the last error is returned.
    pub async fn write_with_options(
        &self,
        bucket: &str,
        org: &str,
        options: &WriteOptions,
        points: impl IntoIterator<Item = Point>,
    ) -> Result<()> {
        let mut lines = Vec::new();
        for point in points {
            lines.push(point.to_line_protocol(options.write_precision)?);
        }
        if lines.is_empty() {
            return Ok(());
        }
        let destination = WriteDestination::new(bucket, org, options.write_precision);
        let body = lines.join("\n");
        deliver_with_retry(self, &destination, &body, &options.retry_policy()).await
    }

    /// POST one line protocol payload to `/api/v2/write`.
    pub(crate) async fn post_line_protocol(
        &self,
        destination: &WriteDestination,
        body: String,
    ) -> Result<()> {
        let endpoint = self.endpoint("/api/v2/write");
        let response = self
            .http
            .request(Method::POST, &endpoint)
            .header("Authorization", self.authorization())
            .header("Content-Type", "text/plain; charset=utf-8")
            .query(&[
                ("org", destination.org()),
                ("bucket", destination.bucket()),
                ("precision", destination.precision().as_str()),
            ])
            .body(body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::from_response(response).await)
        }
    }

    /// Create a background write pipeline with default options.
    ///
    /// Must be called within a tokio runtime; the pipeline spawns a worker
    /// task that owns batching, flushing and retries.
    pub fn write_api(&self) -> WriteApi {
        WriteApi::new(self.clone(), WriteOptions::default(), WriteCallbacks::default())
    }

    /// Create a background write pipeline with explicit options and
    /// delivery callbacks.
    pub fn write_api_with_options(
        &self,
        options: WriteOptions,
        callbacks: WriteCallbacks,
    ) -> WriteApi {
        WriteApi::new(self.clone(), options, callbacks)
    }

    /// Delete data in a time range, optionally narrowed by a predicate like
    /// `_measurement="sensor" AND tag="value"`. An empty predicate deletes
    /// everything in the range.
    pub async fn delete_data(
        &self,
        bucket: &str,
        org: &str,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        predicate: impl Into<String>,
    ) -> Result<()> {
        let predicate = predicate.into();
        let request = DeletePredicateRequest {
            start,
            stop,
            predicate: (!predicate.is_empty()).then_some(predicate),
        };
        let body = serde_json::to_string(&request)?;

        let response = self
            .http
            .request(Method::POST, &self.endpoint("/api/v2/delete"))
            .header("Authorization", self.authorization())
            .header("Content-Type", "application/json")
            .query(&[("org", org), ("bucket", bucket)])
            .body(body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::from_response(response).await)
        }
    }

    // ------------------------------------------------------------------
    // Server state
    // ------------------------------------------------------------------

    /// Check the health of the server.
    ///
    /// Never fails: transport errors and undecodable responses degrade to a
    /// failed check carrying the error message.
    pub async fn health(&self) -> HealthCheck {
        let outcome = async {
            let response = self
                .http
                .request(Method::GET, &self.endpoint("/health"))
                .header("Authorization", self.authorization())
                .send()
                .await?;
            // The health endpoint answers 200 or 503, both with a JSON body.
            let text = response.text().await?;
            Ok::<HealthCheck, Error>(serde_json::from_str(&text)?)
        }
        .await;

        match outcome {
            Ok(check) => check,
            Err(err) => HealthCheck::fail("influxdb", err.to_string()),
        }
    }

    /// Readiness of the server since startup.
    pub async fn ready(&self) -> Result<Ready> {
        self.api_get("/ready", &[]).await
    }

    // ------------------------------------------------------------------
    // Management APIs
    // ------------------------------------------------------------------

    /// Bucket management API.
    pub fn buckets(&self) -> BucketsApi {
        BucketsApi::new(self.clone())
    }

    /// Organization management API.
    pub fn organizations(&self) -> OrganizationsApi {
        OrganizationsApi::new(self.clone())
    }

    /// User management API.
    pub fn users(&self) -> UsersApi {
        UsersApi::new(self.clone())
    }

    /// Authorization (API token) management API.
    pub fn authorizations(&self) -> AuthorizationsApi {
        AuthorizationsApi::new(self.clone())
    }

    /// Task management API.
    pub fn tasks(&self) -> TasksApi {
        TasksApi::new(self.clone())
    }

    // ------------------------------------------------------------------
    // JSON plumbing shared by the management APIs
    // ------------------------------------------------------------------

    pub(crate) async fn api_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .http
            .request(Method::GET, &self.endpoint(path))
            .header("Authorization", self.authorization())
            .query(query)
            .send()
            .await?;
        self.decode_json(response).await
    }

    pub(crate) async fn api_post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send_json(Method::POST, path, body).await
    }

    pub(crate) async fn api_patch<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send_json(Method::PATCH, path, body).await
    }

    pub(crate) async fn api_delete(&self, path: &str) -> Result<()> {
        let response = self
            .http
            .request(Method::DELETE, &self.endpoint(path))
            .header("Authorization", self.authorization())
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::from_response(response).await)
        }
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let payload = serde_json::to_string(body)?;
        let response = self
            .http
            .request(method, &self.endpoint(path))
            .header("Authorization", self.authorization())
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await?;
        self.decode_json(response).await
    }

    async fn decode_json<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}
