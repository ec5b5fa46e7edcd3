use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "alert_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    WaterCut,
    PowerOutage,
    Security,
    Maintenance,
    Emergency,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, PartialOrd, Ord, ToSchema)]
#[sqlx(type_name = "alert_severity", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for AlertSeverity {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct EmergencyAlert {
    pub id: Uuid,
    pub society_id: Uuid,
    pub title: String,
    pub message: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub created_by: Uuid,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmergencyAlert {
    /// Active and not past its expiry.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AlertRow {
    #[sqlx(flatten)]
    pub alert: EmergencyAlert,
    pub created_by_name: Option<String>,
    pub is_acknowledged: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertResponse {
    pub id: Uuid,
    pub society: Uuid,
    pub title: String,
    pub message: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub created_by: Uuid,
    pub created_by_name: Option<String>,
    pub is_active: bool,
    /// Active and not expired right now
    pub is_live: bool,
    pub is_acknowledged: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AlertRow> for AlertResponse {
    fn from(row: AlertRow) -> Self {
        let a = row.alert;
        let is_live = a.is_live(Utc::now());
        Self {
            id: a.id,
            society: a.society_id,
            title: a.title,
            message: a.message,
            alert_type: a.alert_type,
            severity: a.severity,
            created_by: a.created_by,
            created_by_name: row.created_by_name,
            is_active: a.is_active,
            is_live,
            is_acknowledged: row.is_acknowledged,
            expires_at: a.expires_at,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateAlertRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1))]
    pub message: String,
    pub alert_type: AlertType,
    pub severity: Option<AlertSeverity>,
    pub is_active: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateAlertRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1))]
    pub message: Option<String>,
    pub alert_type: Option<AlertType>,
    pub severity: Option<AlertSeverity>,
    pub is_active: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AcknowledgeResponse {
    pub message: String,
    pub is_acknowledged: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnacknowledgedCountResponse {
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn alert(is_active: bool, expires_at: Option<DateTime<Utc>>) -> EmergencyAlert {
        EmergencyAlert {
            id: Uuid::new_v4(),
            society_id: Uuid::new_v4(),
            title: "Water cut".into(),
            message: "Tank cleaning until 6pm".into(),
            alert_type: AlertType::WaterCut,
            severity: AlertSeverity::default(),
            created_by: Uuid::new_v4(),
            is_active,
            expires_at,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_is_live() {
        let now = Utc::now();
        assert!(alert(true, None).is_live(now));
        assert!(alert(true, Some(now + Duration::hours(1))).is_live(now));
        assert!(!alert(true, Some(now - Duration::minutes(1))).is_live(now));
        assert!(!alert(false, None).is_live(now));
    }

    #[test]
    fn test_severity_order() {
        assert_eq!(AlertSeverity::default(), AlertSeverity::Medium);
        assert!(AlertSeverity::Critical > AlertSeverity::High);
        assert!(AlertSeverity::Low < AlertSeverity::Medium);
    }
}
