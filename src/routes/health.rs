use axum::{extract::State, http::StatusCode, response::Json};
use diesel::prelude::*;
use serde_json::json;
use tracing::warn;

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let database = state
        .db()
        .and_then(|mut conn| Ok(diesel::sql_query("SELECT 1").execute(&mut conn)?));
    match database {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "UP" }))),
        Err(err) => {
            warn!(error = %err, "health check could not reach the database");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "DOWN" })),
            )
        }
    }
}
