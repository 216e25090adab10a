//! HROne payloads and their QMS mapping

use qms_core::traits::Id;
use qms_models::{Department, MemberRole, MemberStatus, TeamMember};
use serde::{Deserialize, Deserializer, Serialize};

/// HROne identifiers arrive as numbers or strings depending on the endpoint
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HrDepartment {
    #[serde(alias = "departmentId", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(alias = "departmentName")]
    pub name: String,
    #[serde(default, alias = "departmentCode")]
    pub code: Option<String>,
}

impl HrDepartment {
    pub fn to_department(&self) -> Department {
        Department {
            id: None,
            name: self.name.trim().to_string(),
            code: self.code.clone(),
            hrone_department_id: Some(self.id.clone()),
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HrEmployee {
    #[serde(alias = "employeeId", deserialize_with = "string_or_number")]
    pub employee_code: String,
    #[serde(alias = "employeeName")]
    pub full_name: String,
    #[serde(default, alias = "officialEmail")]
    pub email: Option<String>,
    #[serde(default)]
    pub department_name: Option<String>,
    /// HROne employment status (`Active`, `Inactive`, `Resigned`, ...)
    #[serde(default)]
    pub status: Option<String>,
}

impl HrEmployee {
    pub fn is_active(&self) -> bool {
        self.status
            .as_deref()
            .map_or(true, |s| s.eq_ignore_ascii_case("active"))
    }

    /// Team member for this employee; `None` without a usable e-mail
    pub fn to_member(&self, department_id: Option<Id>) -> Option<TeamMember> {
        let email = self.email.as_deref()?.trim().to_lowercase();
        if email.is_empty() {
            return None;
        }
        Some(TeamMember {
            id: None,
            full_name: self.full_name.trim().to_string(),
            email,
            role: MemberRole::User,
            department_id,
            status: if self.is_active() {
                MemberStatus::Active
            } else {
                MemberStatus::Inactive
            },
            hrone_employee_code: Some(self.employee_code.clone()),
            created_at: None,
            updated_at: None,
        })
    }
}

/// Member data pushed back to HROne
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HrEmployeePush {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_code: Option<String>,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_name: Option<String>,
    pub status: String,
}

impl HrEmployeePush {
    pub fn from_member(member: &TeamMember, department_name: Option<String>) -> Self {
        Self {
            employee_code: member.hrone_employee_code.clone(),
            full_name: member.full_name.clone(),
            email: member.email.clone(),
            department_name,
            status: if member.is_active() { "Active" } else { "Inactive" }.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_employee_aliases_and_mapping() {
        let employee: HrEmployee = serde_json::from_value(serde_json::json!({
            "employeeId": 1042,
            "employeeName": " Kiran Shah ",
            "officialEmail": "Kiran.Shah@Example.com",
            "departmentName": "Production",
            "status": "Resigned"
        }))
        .unwrap();
        assert_eq!(employee.employee_code, "1042");

        let member = employee.to_member(Some(4)).unwrap();
        assert_eq!(member.email, "kiran.shah@example.com");
        assert_eq!(member.full_name, "Kiran Shah");
        assert_eq!(member.status, MemberStatus::Inactive);
        assert_eq!(member.department_id, Some(4));
    }

    #[test]
    fn test_employee_without_email_is_not_mapped() {
        let employee = HrEmployee {
            employee_code: "E1".into(),
            full_name: "No Mail".into(),
            email: None,
            department_name: None,
            status: None,
        };
        assert!(employee.is_active());
        assert!(employee.to_member(None).is_none());
    }

    #[test]
    fn test_department_ids_accept_strings() {
        let department: HrDepartment = serde_json::from_value(serde_json::json!({
            "departmentId": "D-7",
            "departmentName": "Quality"
        }))
        .unwrap();
        assert_eq!(department.to_department().hrone_department_id.as_deref(), Some("D-7"));
    }
}
