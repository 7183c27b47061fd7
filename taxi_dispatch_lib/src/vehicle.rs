use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: i64,
    pub company_id: i64,
    pub license_plate: String,
    pub brand: String,
    pub model: String,
    pub color: Option<String>,
}
