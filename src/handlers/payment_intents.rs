use crate::{
    errors::ApiError,
    models::{CreatePaymentIntentRequest, PaymentIntentResponse, UpdatePaymentIntentRequest},
    services::stripe::IDEMPOTENCY_HEADER,
    AppState,
};
use axum::{extract::State, http::HeaderMap, Json};

/// Longest idempotency key forwarded to the payment platform
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// `POST /api/create-payment-intent`
pub async fn create_payment_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreatePaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>, ApiError> {
    let idempotency_key = match headers.get(IDEMPOTENCY_HEADER) {
        None => None,
        Some(value) => Some(
            value
                .to_str()
                .ok()
                .map(str::trim)
                .filter(|key| !key.is_empty() && key.len() <= MAX_IDEMPOTENCY_KEY_LEN)
                .ok_or_else(|| ApiError::bad_request("Invalid Idempotency-Key header"))?
                .to_string(),
        ),
    };

    let response = state
        .services
        .payment_intents
        .create(request, idempotency_key)
        .await?;
    Ok(Json(response))
}

/// `POST /api/update-payment-intent`
pub async fn update_payment_intent(
    State(state): State<AppState>,
    Json(request): Json<UpdatePaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>, ApiError> {
    let response = state.services.payment_intents.update(request).await?;
    Ok(Json(response))
}
