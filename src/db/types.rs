use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "userrole", rename_all = "snake_case")]
pub(crate) enum UserRole {
    Student,
    Admin,
    RootAdmin,
}

impl UserRole {
    /// Admins and root admins share the authoring and analytics surface.
    pub(crate) fn is_staff(self) -> bool {
        matches!(self, UserRole::Admin | UserRole::RootAdmin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "sessionstatus", rename_all = "lowercase")]
pub(crate) enum SessionStatus {
    Active,
    Finished,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "resultstatus", rename_all = "snake_case")]
pub(crate) enum ResultStatus {
    Completed,
    Abandoned,
    AutoSubmitted,
}

impl ResultStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ResultStatus::Completed => "completed",
            ResultStatus::Abandoned => "abandoned",
            ResultStatus::AutoSubmitted => "auto-submitted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_status_uses_hyphenated_wire_name() {
        let encoded = serde_json::to_string(&ResultStatus::AutoSubmitted).unwrap();
        assert_eq!(encoded, "\"auto-submitted\"");
        let decoded: ResultStatus = serde_json::from_str("\"auto-submitted\"").unwrap();
        assert_eq!(decoded, ResultStatus::AutoSubmitted);
        assert_eq!(decoded.as_str(), "auto-submitted");
    }

    #[test]
    fn staff_roles() {
        assert!(!UserRole::Student.is_staff());
        assert!(UserRole::Admin.is_staff());
        assert!(UserRole::RootAdmin.is_staff());
    }
}
