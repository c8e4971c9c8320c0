//! 用户举报实体

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ReportId, Timestamp, UserId};

/// 针对其他用户的举报记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub reporter: UserId,
    pub reported_user: UserId,
    pub reason: String,
    /// 被举报消息的正文快照（可选）
    pub message_text: Option<String>,
    pub created_at: Timestamp,
}

impl Report {
    pub fn new(
        id: ReportId,
        reporter: UserId,
        reported_user: UserId,
        reason: impl Into<String>,
        message_text: Option<String>,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        let reason = reason.into().trim().to_owned();
        if reason.is_empty() {
            return Err(DomainError::invalid_argument("reason", "cannot be empty"));
        }
        if reporter == reported_user {
            return Err(DomainError::invalid_argument(
                "reported_user",
                "cannot report yourself",
            ));
        }
        Ok(Self {
            id,
            reporter,
            reported_user,
            reason,
            message_text,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn self_report_is_rejected() {
        let user = UserId::generate();
        let result = Report::new(ReportId::generate(), user, user, "spam", None, Utc::now());
        assert!(result.is_err());
    }

    #[test]
    fn empty_reason_is_rejected() {
        let result = Report::new(
            ReportId::generate(),
            UserId::generate(),
            UserId::generate(),
            "  ",
            None,
            Utc::now(),
        );
        assert!(result.is_err());
    }
}
