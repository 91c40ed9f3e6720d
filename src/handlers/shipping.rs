use crate::{
    errors::ApiError,
    metrics::SHIPPING_QUOTES,
    middleware_helpers::sanitize::{sanitize_postal_code, sanitize_string},
    models::{QuoteDestination, ShippingQuoteRequest, ShippingQuoteResponse},
    AppState,
};
use axum::{extract::State, Json};

/// `POST /api/shipping-cost`
pub async fn shipping_cost(
    State(state): State<AppState>,
    Json(request): Json<ShippingQuoteRequest>,
) -> Result<Json<ShippingQuoteResponse>, ApiError> {
    let request = ShippingQuoteRequest {
        address: QuoteDestination {
            city: sanitize_string(&request.address.city),
            state: sanitize_string(&request.address.state).to_uppercase(),
            postal_code: sanitize_postal_code(&request.address.postal_code),
            country: request.address.country,
        },
        products: request.products,
    };

    let cost = state.services.shipping.quote(&request)?;
    SHIPPING_QUOTES.inc();
    Ok(Json(ShippingQuoteResponse { cost }))
}
