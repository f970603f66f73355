//! Owner account model.
//!
//! A user owns zero or more API keys. Accounts exist so keys can be grouped
//! on the dashboard; there is no password here. Identity is established
//! upstream and only the email reaches this service.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Maps to the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}
