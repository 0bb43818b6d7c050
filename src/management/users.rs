//! User management.

use crate::client::Client;
use crate::error::Result;
use crate::management::models::{PostUserRequest, User, Users};

/// Handle for `/api/v2/users` and `/api/v2/me`.
#[derive(Clone)]
pub struct UsersApi {
    client: Client,
}

impl UsersApi {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    /// The user the client's token belongs to.
    pub async fn me(&self) -> Result<User> {
        self.client.api_get("/api/v2/me", &[]).await
    }

    /// Create a user.
    pub async fn create(&self, name: &str) -> Result<User> {
        let request = PostUserRequest {
            name: name.to_owned(),
        };
        self.client.api_post("/api/v2/users", &request).await
    }

    /// Fetch one user by id.
    pub async fn find_by_id(&self, id: &str) -> Result<User> {
        self.client.api_get(&format!("/api/v2/users/{id}"), &[]).await
    }

    /// List all users visible to the token.
    pub async fn list(&self) -> Result<Vec<User>> {
        let users: Users = self.client.api_get("/api/v2/users", &[]).await?;
        Ok(users.users)
    }

    /// Delete a user by id.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.client.api_delete(&format!("/api/v2/users/{id}")).await
    }
}
