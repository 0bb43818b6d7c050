//! Task management.

use chrono::{DateTime, Utc};

use crate::client::Client;
use crate::error::Result;
use crate::management::models::{
    Run, RunManually, Runs, Task, TaskCreateRequest, TaskUpdateRequest, Tasks,
};

/// Handle for `/api/v2/tasks`.
#[derive(Clone)]
pub struct TasksApi {
    client: Client,
}

/// Prepend the `option task` block declaring the task name and schedule.
///
/// `schedule` must already be valid Flux: a bare duration for `every`
/// (`1h`), a quoted string for `cron` (`"0 * * * *"`).
fn flux_with_task_option(name: &str, flux: &str, schedule_key: &str, schedule: &str) -> String {
    format!("option task = {{name: \"{name}\", {schedule_key}: {schedule}}}\n\n{flux}")
}

impl TasksApi {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a task. The request's Flux script must declare its own
    /// `option task` block.
    pub async fn create(&self, request: &TaskCreateRequest) -> Result<Task> {
        self.client.api_post("/api/v2/tasks", request).await
    }

    /// Create a task running `flux` on a fixed interval, given as a Flux
    /// duration like `1h` or `30m`.
    pub async fn create_every(
        &self,
        name: &str,
        flux: &str,
        every: &str,
        org_id: &str,
    ) -> Result<Task> {
        let request =
            TaskCreateRequest::new(org_id, flux_with_task_option(name, flux, "every", every));
        self.create(&request).await
    }

    /// Create a task running `flux` on a cron schedule like `0 * * * *`.
    pub async fn create_cron(
        &self,
        name: &str,
        flux: &str,
        cron: &str,
        org_id: &str,
    ) -> Result<Task> {
        let quoted = format!("\"{cron}\"");
        let request =
            TaskCreateRequest::new(org_id, flux_with_task_option(name, flux, "cron", &quoted));
        self.create(&request).await
    }

    /// Fetch one task by id.
    pub async fn find_by_id(&self, id: &str) -> Result<Task> {
        self.client.api_get(&format!("/api/v2/tasks/{id}"), &[]).await
    }

    /// List all tasks visible to the token.
    pub async fn list(&self) -> Result<Vec<Task>> {
        let tasks: Tasks = self.client.api_get("/api/v2/tasks", &[]).await?;
        Ok(tasks.tasks)
    }

    /// Update fields of an existing task; `None` fields are left unchanged.
    pub async fn update(&self, id: &str, request: &TaskUpdateRequest) -> Result<Task> {
        self.client
            .api_patch(&format!("/api/v2/tasks/{id}"), request)
            .await
    }

    /// Delete a task by id.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.client.api_delete(&format!("/api/v2/tasks/{id}")).await
    }

    /// Trigger a run outside the task's schedule.
    pub async fn run_manually(
        &self,
        id: &str,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> Result<Run> {
        self.client
            .api_post(
                &format!("/api/v2/tasks/{id}/runs"),
                &RunManually { scheduled_for },
            )
            .await
    }

    /// List recent runs of a task.
    pub async fn get_runs(&self, id: &str) -> Result<Vec<Run>> {
        let runs: Runs = self
            .client
            .api_get(&format!("/api/v2/tasks/{id}/runs"), &[])
            .await?;
        Ok(runs.runs)
    }
}
