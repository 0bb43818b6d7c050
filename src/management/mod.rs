//! Management APIs: buckets, organizations, users, authorizations and tasks.
//!
//! Each handle is a thin wrapper over the client's JSON plumbing, obtained
//! from the corresponding [`Client`](crate::Client) accessor, e.g.
//! [`Client::buckets`](crate::Client::buckets).

pub mod models;

mod authorizations;
mod buckets;
mod organizations;
mod tasks;
mod users;

pub use authorizations::AuthorizationsApi;
pub use buckets::BucketsApi;
pub use organizations::OrganizationsApi;
pub use tasks::TasksApi;
pub use users::UsersApi;
