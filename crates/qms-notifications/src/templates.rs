//! Message templates
//!
//! Every message carries a plain-text body; the dashboard report adds an
//! HTML table.

use chrono::NaiveDate;
use qms_core::config::EmailConfig;
use qms_models::{Document, HierarchyStatus, Task, TaskApprovalStatus};

use crate::email::{EmailAddress, EmailMessage};

/// Renders QMS e-mails
#[derive(Debug, Clone)]
pub struct EmailTemplates {
    base_url: String,
    from: EmailAddress,
}

/// Per-department line of the dashboard report
#[derive(Debug, Clone, PartialEq)]
pub struct DepartmentLine {
    pub name: String,
    pub total: i64,
    pub open: i64,
    pub overdue: i64,
}

/// Figures rendered into the dashboard report
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardDigest {
    pub date: NaiveDate,
    /// (label, value) pairs in display order
    pub totals: Vec<(String, i64)>,
    pub departments: Vec<DepartmentLine>,
}

impl EmailTemplates {
    pub fn new(base_url: impl Into<String>, from: EmailAddress) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            from,
        }
    }

    pub fn from_config(config: &EmailConfig) -> Self {
        Self::new(
            config.app_base_url.clone(),
            EmailAddress::new(config.from_address.clone()).with_name(config.from_name.clone()),
        )
    }

    pub fn from_address(&self) -> &EmailAddress {
        &self.from
    }

    fn message(&self, to: EmailAddress, subject: String, body: String) -> EmailMessage {
        EmailMessage::new(self.from.clone(), vec![to], subject, body)
    }

    /// Free-form message from the `send-email` function
    pub fn custom(&self, to: Vec<EmailAddress>, subject: &str, text: &str, html: Option<&str>) -> EmailMessage {
        let message = EmailMessage::new(self.from.clone(), to, subject, text);
        match html {
            Some(html) => message.with_html(html),
            None => message,
        }
    }

    pub fn otp_code(&self, to: &str, code: &str, ttl_minutes: i64) -> EmailMessage {
        self.message(
            EmailAddress::new(to),
            "[QMS] Your sign-in code".to_string(),
            format!(
                "Your QMS sign-in code is {code}.\n\n\
                 It expires in {ttl_minutes} minutes. If you did not request it, ignore this e-mail.\n"
            ),
        )
    }

    pub fn invitation(&self, to: &str, name: &str, invited_by: Option<&str>) -> EmailMessage {
        let by = invited_by
            .map(|inviter| format!(" by {inviter}"))
            .unwrap_or_default();
        self.message(
            EmailAddress::new(to).with_name(name),
            "[QMS] You have been invited".to_string(),
            format!(
                "Hello {name},\n\n\
                 You have been invited{by} to the Quality Management System.\n\
                 Complete your sign-up here: {}/signup?email={to}\n",
                self.base_url
            ),
        )
    }

    pub fn account_approved(&self, to: &str, name: &str) -> EmailMessage {
        self.message(
            EmailAddress::new(to).with_name(name),
            "[QMS] Your account has been approved".to_string(),
            format!(
                "Hello {name},\n\n\
                 Your QMS account has been approved. Sign in at {}/login\n",
                self.base_url
            ),
        )
    }

    pub fn account_rejected(&self, to: &str, name: &str, reason: Option<&str>) -> EmailMessage {
        let reason = reason
            .map(|r| format!("\nReason: {r}\n"))
            .unwrap_or_default();
        self.message(
            EmailAddress::new(to).with_name(name),
            "[QMS] Your account request was declined".to_string(),
            format!("Hello {name},\n\nYour QMS account request was declined.\n{reason}"),
        )
    }

    /// A revision is waiting for the recipient's sign-off
    pub fn document_action_required(
        &self,
        to: &str,
        document: &Document,
        revision_number: i32,
        status: HierarchyStatus,
    ) -> EmailMessage {
        let step = match status {
            HierarchyStatus::PendingChecker => "check",
            _ => "approve",
        };
        let id = document.id.unwrap_or_default();
        self.message(
            EmailAddress::new(to),
            format!("[QMS] {} rev {} awaits your {}", document.document_number, revision_number, step),
            format!(
                "Document {} \"{}\" revision {} is waiting for you to {}.\n\n\
                 Open it: {}/documents/{}\n",
                document.document_number, document.title, revision_number, step, self.base_url, id
            ),
        )
        .with_qms_headers("Document", id)
    }

    /// Terminal decision on a revision, sent to the initiator
    pub fn document_decided(
        &self,
        to: &str,
        document: &Document,
        revision_number: i32,
        status: HierarchyStatus,
        reason: Option<&str>,
    ) -> EmailMessage {
        let outcome = if status == HierarchyStatus::Approved {
            "approved"
        } else {
            "rejected"
        };
        let reason = reason
            .map(|r| format!("Reason: {r}\n"))
            .unwrap_or_default();
        let id = document.id.unwrap_or_default();
        self.message(
            EmailAddress::new(to),
            format!("[QMS] {} rev {} {}", document.document_number, revision_number, outcome),
            format!(
                "Document {} \"{}\" revision {} was {}.\n{}\n\
                 Open it: {}/documents/{}\n",
                document.document_number, document.title, revision_number, outcome, reason, self.base_url, id
            ),
        )
        .with_qms_headers("Document", id)
    }

    /// A completed task waits for the approver
    pub fn task_approval_requested(&self, to: &str, task: &Task) -> EmailMessage {
        let id = task.id.unwrap_or_default();
        self.message(
            EmailAddress::new(to),
            format!("[QMS] Task #{} awaits your approval", id),
            format!(
                "Task \"{}\" was completed and needs your approval.\n\n\
                 Open it: {}/tasks/{}\n",
                task.title, self.base_url, id
            ),
        )
        .with_qms_headers("Task", id)
    }

    pub fn task_decided(&self, to: &str, task: &Task) -> EmailMessage {
        let id = task.id.unwrap_or_default();
        let outcome = match task.approval_status {
            Some(TaskApprovalStatus::Rejected) => "rejected",
            _ => "approved",
        };
        let reason = task
            .approval_reason
            .as_deref()
            .map(|r| format!("Reason: {r}\n"))
            .unwrap_or_default();
        self.message(
            EmailAddress::new(to),
            format!("[QMS] Task #{} {}", id, outcome),
            format!(
                "Your task \"{}\" was {}.\n{}\n\
                 Open it: {}/tasks/{}\n",
                task.title, outcome, reason, self.base_url, id
            ),
        )
        .with_qms_headers("Task", id)
    }

    pub fn dashboard_report(&self, to: Vec<EmailAddress>, digest: &DashboardDigest) -> EmailMessage {
        let mut text = format!("QMS dashboard for {}\n\n", digest.date);
        for (label, value) in &digest.totals {
            text.push_str(&format!("{label}: {value}\n"));
        }
        if !digest.departments.is_empty() {
            text.push_str("\nBy department (total / open / overdue):\n");
            for line in &digest.departments {
                text.push_str(&format!(
                    "- {}: {} / {} / {}\n",
                    line.name, line.total, line.open, line.overdue
                ));
            }
        }
        text.push_str(&format!("\nDashboard: {}/dashboard\n", self.base_url));

        let mut rows = String::new();
        for line in &digest.departments {
            rows.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&line.name),
                line.total,
                line.open,
                line.overdue
            ));
        }
        let totals: String = digest
            .totals
            .iter()
            .map(|(label, value)| format!("<li>{}: <strong>{}</strong></li>", escape_html(label), value))
            .collect();
        let html = format!(
            r#"<!DOCTYPE html>
<html>
<body style="font-family: sans-serif">
    <h2>QMS dashboard for {date}</h2>
    <ul>{totals}</ul>
    <table border="1" cellpadding="4" cellspacing="0">
        <tr><th>Department</th><th>Total</th><th>Open</th><th>Overdue</th></tr>
        {rows}
    </table>
    <p><a href="{base}/dashboard">Open the dashboard</a></p>
</body>
</html>"#,
            date = digest.date,
            base = self.base_url,
        );

        EmailMessage::new(
            self.from.clone(),
            to,
            format!("[QMS] Dashboard report {}", digest.date),
            text,
        )
        .with_html(html)
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn templates() -> EmailTemplates {
        EmailTemplates::new("https://qms.example.com/", EmailAddress::new("qms@example.com"))
    }

    fn document() -> Document {
        Document {
            id: Some(9),
            title: "Calibration procedure".into(),
            document_number: "SOP-007".into(),
            owner_id: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_otp_message() {
        let message = templates().otp_code("user@example.com", "048213", 10);
        assert_eq!(message.to[0].email, "user@example.com");
        assert!(message.text_body.contains("048213"));
        assert!(message.text_body.contains("10 minutes"));
    }

    #[test]
    fn test_document_messages_link_to_document() {
        let t = templates();
        let pending = t.document_action_required("c@example.com", &document(), 2, HierarchyStatus::PendingChecker);
        assert_eq!(pending.subject, "[QMS] SOP-007 rev 2 awaits your check");
        assert!(pending.text_body.contains("https://qms.example.com/documents/9"));

        let rejected = t.document_decided(
            "i@example.com",
            &document(),
            2,
            HierarchyStatus::Rejected,
            Some("Wrong template"),
        );
        assert!(rejected.subject.ends_with("rejected"));
        assert!(rejected.text_body.contains("Reason: Wrong template"));
        assert!(rejected.headers.contains(&("X-QMS-Id".to_string(), "9".to_string())));
    }

    #[test]
    fn test_dashboard_report_escapes_department_names() {
        let digest = DashboardDigest {
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            totals: vec![("Overdue tasks".into(), 4)],
            departments: vec![DepartmentLine {
                name: "R&D".into(),
                total: 10,
                open: 6,
                overdue: 4,
            }],
        };
        let message = templates().dashboard_report(vec![EmailAddress::new("m@example.com")], &digest);
        assert!(message.text_body.contains("Overdue tasks: 4"));
        assert!(message.text_body.contains("- R&D: 10 / 6 / 4"));
        assert!(message.html_body.unwrap().contains("R&amp;D"));
    }
}
