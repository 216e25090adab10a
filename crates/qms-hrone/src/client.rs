//! HROne REST client

use qms_core::config::HrOneConfig;
use qms_core::error::QmsError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::types::{HrDepartment, HrEmployee, HrEmployeePush};

#[derive(Debug, Error)]
pub enum HrOneError {
    #[error("HROne API token is not configured")]
    NotConfigured,
    #[error("Invalid HROne URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("HROne request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HROne returned {status}: {body}")]
    Status { status: u16, body: String },
}

pub type HrOneResult<T> = Result<T, HrOneError>;

impl From<HrOneError> for QmsError {
    fn from(err: HrOneError) -> Self {
        match err {
            HrOneError::NotConfigured | HrOneError::InvalidUrl(_) => QmsError::Config(err.to_string()),
            other => QmsError::external("hrone", other.to_string()),
        }
    }
}

/// List endpoints answer either with a bare array or inside `data`
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Wrapped { data: Vec<T> },
    Bare(Vec<T>),
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Wrapped { data } => data,
            Listing::Bare(items) => items,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HrOneClient {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

impl HrOneClient {
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> HrOneResult<Self> {
        // A trailing slash keeps the base path when joining endpoint paths
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: Url::parse(&base)?,
            token: token.into(),
        })
    }

    pub fn from_config(config: &HrOneConfig) -> HrOneResult<Self> {
        let token = config.api_token.clone().ok_or(HrOneError::NotConfigured)?;
        Self::new(
            &config.base_url,
            token,
            Duration::from_secs(config.request_timeout_seconds),
        )
    }

    async fn get_list<T: DeserializeOwned>(&self, endpoint: &str) -> HrOneResult<Vec<T>> {
        let url = self.base_url.join(endpoint)?;
        let response = self.client.get(url).bearer_auth(&self.token).send().await?;
        let response = check_status(response).await?;
        let listing: Listing<T> = response.json().await?;
        Ok(listing.into_vec())
    }

    #[instrument(skip(self))]
    pub async fn list_employees(&self) -> HrOneResult<Vec<HrEmployee>> {
        let employees = self.get_list("api/employees").await?;
        debug!(count = employees.len(), "fetched HROne employees");
        Ok(employees)
    }

    #[instrument(skip(self))]
    pub async fn list_departments(&self) -> HrOneResult<Vec<HrDepartment>> {
        let departments = self.get_list("api/departments").await?;
        debug!(count = departments.len(), "fetched HROne departments");
        Ok(departments)
    }

    #[instrument(skip(self, employee), fields(email = %employee.email))]
    pub async fn push_employee(&self, employee: &HrEmployeePush) -> HrOneResult<()> {
        let url = self.base_url.join("api/employees")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(employee)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> HrOneResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HrOneError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> HrOneClient {
        HrOneClient::new(&format!("{}/hr", server.uri()), "hr-token", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_list_employees_wrapped_in_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hr/api/employees"))
            .and(header("authorization", "Bearer hr-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "employeeCode": "E1", "fullName": "A One", "email": "a@example.com", "status": "Active" },
                    { "employeeCode": 2, "fullName": "B Two" }
                ]
            })))
            .mount(&server)
            .await;

        let employees = client(&server).await.list_employees().await.unwrap();
        assert_eq!(employees.len(), 2);
        assert_eq!(employees[1].employee_code, "2");
    }

    #[tokio::test]
    async fn test_list_departments_bare_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hr/api/departments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 11, "name": "Quality", "code": "QA" }
            ])))
            .mount(&server)
            .await;

        let departments = client(&server).await.list_departments().await.unwrap();
        assert_eq!(departments[0].id, "11");
        assert_eq!(departments[0].code.as_deref(), Some("QA"));
    }

    #[tokio::test]
    async fn test_push_employee_and_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hr/api/employees"))
            .and(body_partial_json(json!({ "email": "ok@example.com" })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/hr/api/employees"))
            .and(body_partial_json(json!({ "email": "bad@example.com" })))
            .respond_with(ResponseTemplate::new(422).set_body_string("duplicate"))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let push = |email: &str| HrEmployeePush {
            employee_code: None,
            full_name: "Someone".into(),
            email: email.into(),
            department_name: None,
            status: "Active".into(),
        };

        client.push_employee(&push("ok@example.com")).await.unwrap();
        match client.push_employee(&push("bad@example.com")).await {
            Err(HrOneError::Status { status, body }) => {
                assert_eq!(status, 422);
                assert_eq!(body, "duplicate");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_token_is_a_config_error() {
        let config = qms_core::config::AppConfig::default().hrone;
        let err = HrOneClient::from_config(&config).unwrap_err();
        assert!(matches!(err, HrOneError::NotConfigured));
        assert_eq!(QmsError::from(err).status_code(), 500);
    }
}
