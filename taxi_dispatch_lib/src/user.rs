use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account row from the external user directory. The password hash is a
/// PHC string; verification happens in the server's session authority.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}
