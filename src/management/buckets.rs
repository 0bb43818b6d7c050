//! Bucket management.

use crate::client::Client;
use crate::error::{Error, Result};
use crate::management::models::{Bucket, Buckets, PatchBucketRequest, PostBucketRequest};

/// Handle for `/api/v2/buckets`.
#[derive(Clone)]
pub struct BucketsApi {
    client: Client,
}

impl BucketsApi {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a bucket.
    pub async fn create(&self, request: &PostBucketRequest) -> Result<Bucket> {
        self.client.api_post("/api/v2/buckets", request).await
    }

    /// Fetch one bucket by id.
    pub async fn find_by_id(&self, id: &str) -> Result<Bucket> {
        self.client
            .api_get(&format!("/api/v2/buckets/{id}"), &[])
            .await
    }

    /// Fetch one bucket by name, if it exists.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Bucket>> {
        let buckets: Buckets = self
            .client
            .api_get("/api/v2/buckets", &[("name", name)])
            .await?;
        Ok(buckets.buckets.into_iter().next())
    }

    /// List all buckets visible to the token.
    pub async fn list(&self) -> Result<Vec<Bucket>> {
        let buckets: Buckets = self.client.api_get("/api/v2/buckets", &[]).await?;
        Ok(buckets.buckets)
    }

    /// List buckets belonging to an organization.
    pub async fn list_by_org(&self, org: &str) -> Result<Vec<Bucket>> {
        let buckets: Buckets = self
            .client
            .api_get("/api/v2/buckets", &[("org", org)])
            .await?;
        Ok(buckets.buckets)
    }

    /// Update the name, description and retention rules of an existing
    /// bucket. The bucket must carry its id.
    pub async fn update(&self, bucket: &Bucket) -> Result<Bucket> {
        let id = bucket
            .id
            .as_deref()
            .ok_or_else(|| Error::Validation("bucket id is required for update".to_owned()))?;
        let patch = PatchBucketRequest {
            name: Some(bucket.name.clone()),
            description: bucket.description.clone(),
            retention_rules: Some(bucket.retention_rules.clone()),
        };
        self.client
            .api_patch(&format!("/api/v2/buckets/{id}"), &patch)
            .await
    }

    /// Delete a bucket by id.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.client
            .api_delete(&format!("/api/v2/buckets/{id}"))
            .await
    }
}
