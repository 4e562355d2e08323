use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    clients::mail::{MailClient, MailsDto},
    jobs::JOB_SEND_EMAIL_NOTIFICATION,
    models::Job,
    state::AppState,
};

use super::{JobExecution, JobHandler};

pub struct SendEmailNotificationJob;

impl SendEmailNotificationJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for SendEmailNotificationJob {
    fn job_type(&self) -> &'static str {
        JOB_SEND_EMAIL_NOTIFICATION
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let mails: MailsDto = match serde_json::from_value(job.payload) {
            Ok(mails) => mails,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid notification payload: {err}"),
                }
            }
        };
        deliver(state.mail.as_ref(), &mails).await
    }
}

async fn deliver(mail: &dyn MailClient, mails: &MailsDto) -> JobExecution {
    if mails.mails.is_empty() {
        return JobExecution::Success;
    }
    info!("Sending {} emails", mails.mails.len());
    for entry in &mails.mails {
        info!("Sending {} email to {}", entry.template, entry.email);
    }
    match mail.send_mails(mails).await {
        Ok(()) => JobExecution::Success,
        Err(err) => JobExecution::Failed {
            error: err.to_string(),
        },
    }
}
