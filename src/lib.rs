//! # influxdb2-client
//!
//! Async client for InfluxDB 2.x: batching line protocol writes with retries,
//! streaming Flux queries, and the management APIs.
//!
//! ## Writing
//!
//! Points go through a background pipeline that batches per destination,
//! flushes on size or age, and retries failed deliveries with exponential
//! backoff:
//!
//! ```ignore
//! use influxdb2_client::{Client, Point};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("http://localhost:8086", "my-org", "my-token");
//!     let write_api = client.write_api();
//!
//!     let point = Point::new("temperature")
//!         .tag("location", "office")
//!         .field("value", 21.5);
//!     write_api.write_point("sensors", "my-org", point).await?;
//!
//!     // Deliver everything still buffered before shutting down.
//!     write_api.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! For one-off writes that should report their outcome inline, use
//! [`Client::write`] or [`Client::write_with_options`] instead.
//!
//! ## Querying
//!
//! Query results stream one record at a time, so millions of rows never
//! have to fit in memory:
//!
//! ```ignore
//! use influxdb2_client::Client;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("http://localhost:8086", "my-org", "my-token");
//!
//!     let mut stream = client.query_stream(r#"
//!         from(bucket: "sensors")
//!         |> range(start: -30d)
//!         |> filter(fn: (r) => r._measurement == "temperature")
//!     "#).await?;
//!
//!     while let Some(record) = stream.next().await {
//!         let record = record?;
//!         println!(
//!             "{}: {} = {:?}",
//!             record.measurement().unwrap_or_default(),
//!             record.field().unwrap_or_default(),
//!             record.value()
//!         );
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! [`Client::query_tables`] collects the same results grouped into
//! [`FluxTable`]s with their column metadata when the result set is small
//! enough to hold in memory.
//!
//! ## Features
//!
//! - **Batched writes**: per-destination batching with size, byte and age
//!   triggers, exponential backoff retries and delivery callbacks
//! - **Memory efficient queries**: streams annotated CSV without loading
//!   everything into memory
//! - **All data types**: string, double, bool, long, unsignedLong, duration,
//!   base64Binary, dateTime:RFC3339
//! - **Management APIs**: buckets, organizations, users, authorizations and
//!   tasks
//! - **Async native**: built on tokio and futures

pub mod client;
pub mod error;
pub mod management;
pub mod parser;
pub mod point;
pub mod retry;
pub mod types;
pub mod value;
pub mod write;

// Re-export main types at crate root
pub use client::Client;
pub use error::{Error, Result};
pub use management::{
    AuthorizationsApi, BucketsApi, OrganizationsApi, TasksApi, UsersApi,
};
pub use point::{FieldValue, Point, WritePrecision};
pub use retry::RetryPolicy;
pub use types::{DataType, FluxColumn, FluxRecord, FluxTable, FluxTableMetadata};
pub use value::Value;
pub use write::{WriteApi, WriteCallbacks, WriteDestination, WriteOptions};

// Re-export parser for advanced use cases
pub use parser::{AnnotatedCsvParser, ParseEvent};
