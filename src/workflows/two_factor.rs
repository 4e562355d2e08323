use chrono::Utc;
use diesel::prelude::*;
use tracing::{info, warn};

use crate::{
    auth::{authorize, AuthenticatedUser, Authority},
    clients::identity::{EmailOtpOutcome, OtpInfo},
    error::{AppError, AppResult},
    schema::{consultants, users},
    state::AppState,
};

const TAN_LENGTH: usize = 6;
const OTP_LENGTH: usize = 6;
const OTP_SECRET_LENGTH: usize = 32;

const OTP_CALLERS: &[Authority] = &[Authority::UserDefault, Authority::ConsultantDefault];

pub fn is_valid_tan(tan: &str) -> bool {
    tan.len() == TAN_LENGTH && tan.bytes().all(|byte| byte.is_ascii_digit())
}

pub fn is_valid_app_otp(otp: &str, secret: &str) -> bool {
    otp.chars().count() == OTP_LENGTH && secret.chars().count() == OTP_SECRET_LENGTH
}

pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

pub async fn otp_info(state: &AppState, caller: &AuthenticatedUser) -> AppResult<OtpInfo> {
    authorize(caller, OTP_CALLERS)?;
    Ok(state.identity.otp_info(&caller.username).await?)
}

pub async fn start_email_setup(
    state: &AppState,
    caller: &AuthenticatedUser,
    email: &str,
) -> AppResult<()> {
    authorize(caller, OTP_CALLERS)?;
    let email = email.trim();
    if !is_valid_email(email) {
        return Err(AppError::bad_request("invalid email address"));
    }

    if let Some(owner) = state.identity.find_user_by_email(email).await? {
        if !owner.username.eq_ignore_ascii_case(&caller.username) {
            return Err(AppError::precondition_failed("email address is already in use"));
        }
    }

    state
        .identity
        .send_email_verification(&caller.username, email)
        .await?;
    info!(username = %caller.username, "sent otp verification mail");
    Ok(())
}

pub async fn finish_email_setup(
    state: &AppState,
    caller: &AuthenticatedUser,
    tan: &str,
) -> AppResult<()> {
    authorize(caller, OTP_CALLERS)?;
    if !is_valid_tan(tan) {
        return Err(AppError::bad_request("the code must consist of 6 digits"));
    }

    match state
        .identity
        .finish_email_setup(&caller.username, tan)
        .await?
    {
        EmailOtpOutcome::Created { email } => {
            match email {
                Some(email) => persist_email(state, caller, &email).await?,
                None => warn!(username = %caller.username, "otp setup finished without email"),
            }
            info!(username = %caller.username, "activated email otp");
            Ok(())
        }
        EmailOtpOutcome::AlreadyConfigured => {
            Err(AppError::precondition_failed("email otp is already configured"))
        }
        EmailOtpOutcome::InvalidCode => Err(AppError::bad_request("invalid code")),
        EmailOtpOutcome::AnotherOtpConfigActive => Err(AppError::bad_request(
            "another otp configuration is already active",
        )),
        EmailOtpOutcome::TooManyAttempts => {
            Err(AppError::too_many_requests("too many invalid attempts"))
        }
        EmailOtpOutcome::Failed(reason) => Err(AppError::internal(format!(
            "email otp setup failed: {reason}"
        ))),
    }
}

async fn persist_email(state: &AppState, caller: &AuthenticatedUser, email: &str) -> AppResult<()> {
    {
        let mut conn = state.db()?;
        let now = Utc::now().naive_utc();
        if caller.is_consultant() {
            diesel::update(consultants::table.find(caller.user_id))
                .set((consultants::email.eq(email), consultants::update_date.eq(now)))
                .execute(&mut conn)?;
        } else {
            diesel::update(users::table.find(caller.user_id))
                .set((users::email.eq(Some(email)), users::update_date.eq(now)))
                .execute(&mut conn)?;
        }
    }
    state.identity.update_email(caller.user_id, email).await?;
    Ok(())
}

pub async fn activate_app_otp(
    state: &AppState,
    caller: &AuthenticatedUser,
    otp: &str,
    secret: &str,
) -> AppResult<()> {
    authorize(caller, OTP_CALLERS)?;
    if !is_valid_app_otp(otp, secret) {
        return Err(AppError::bad_request(
            "otp must have 6 and secret 32 characters",
        ));
    }
    let enabled = if caller.is_consultant() {
        state.config.two_factor_auth_consultant_enabled
    } else {
        state.config.two_factor_auth_user_enabled
    };
    if !enabled {
        return Err(AppError::conflict("two factor authentication is disabled for this role"));
    }

    if !state
        .identity
        .setup_app_otp(&caller.username, otp, secret)
        .await?
    {
        return Err(AppError::bad_request("invalid otp"));
    }
    info!(username = %caller.username, "activated app otp");
    Ok(())
}

pub async fn deactivate(state: &AppState, caller: &AuthenticatedUser) -> AppResult<()> {
    authorize(caller, OTP_CALLERS)?;
    state.identity.delete_otp(&caller.username).await?;
    info!(username = %caller.username, "deactivated otp");
    Ok(())
}
