use crate::{errors::ApiError, models::OrderSummary, AppState};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct OrderDetailsQuery {
    pub payment_intent: Option<String>,
    pub session_id: Option<String>,
}

/// `GET /api/order-details?payment_intent=pi_...` (or `session_id=cs_...`)
pub async fn order_details(
    State(state): State<AppState>,
    Query(query): Query<OrderDetailsQuery>,
) -> Result<Json<OrderSummary>, ApiError> {
    let reference = [query.payment_intent, query.session_id]
        .into_iter()
        .flatten()
        .find(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing payment_intent or session_id"))?;

    let summary = state.services.orders.lookup(&reference).await?;
    Ok(Json(summary))
}
