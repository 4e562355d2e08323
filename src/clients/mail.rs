use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TEMPLATE_ASSIGN_ENQUIRY_NOTIFICATION: &str = "assign-enquiry-notification";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("request to mail service failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail service answered {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDataEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailDto {
    pub template: String,
    pub email: String,
    #[serde(default)]
    pub template_data: Vec<TemplateDataEntry>,
}

impl MailDto {
    pub fn new(template: &str, email: &str) -> Self {
        Self {
            template: template.to_string(),
            email: email.to_string(),
            template_data: Vec::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.template_data.push(TemplateDataEntry {
            key: key.to_string(),
            value: value.into(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailsDto {
    pub mails: Vec<MailDto>,
}

#[async_trait]
pub trait MailClient: Send + Sync + 'static {
    async fn send_mails(&self, mails: &MailsDto) -> Result<(), MailError>;
}

pub struct MailServiceClient {
    http: Client,
    base_url: String,
}

impl MailServiceClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MailClient for MailServiceClient {
    async fn send_mails(&self, mails: &MailsDto) -> Result<(), MailError> {
        let response = self
            .http
            .post(format!("{}/mails/send", self.base_url))
            .json(mails)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Status { status, body });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_in_mail_service_shape() {
        let mails = MailsDto {
            mails: vec![MailDto::new(TEMPLATE_ASSIGN_ENQUIRY_NOTIFICATION, "c@example.org")
                .with("name", "consultant")
                .with("nameUser", "asker")],
        };
        let value = serde_json::to_value(&mails).unwrap();
        assert_eq!(value["mails"][0]["template"], "assign-enquiry-notification");
        assert_eq!(value["mails"][0]["templateData"][1]["key"], "nameUser");
        assert_eq!(value["mails"][0]["templateData"][1]["value"], "asker");
    }
}
