use crate::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

/// Keys the browser needs, with a visible message for each disabled feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub publishable_key: Option<String>,
    pub payments_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payments_message: Option<String>,
    pub turnstile_site_key: Option<String>,
    pub bot_protection_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_protection_message: Option<String>,
    pub currency: String,
    pub checkout_debounce_ms: u64,
}

pub async fn client_config(State(state): State<AppState>) -> Json<ClientConfig> {
    let config = &state.config;
    let publishable_key = config.stripe_publishable_key().map(str::to_string);
    let turnstile_site_key = config.turnstile_site_key().map(str::to_string);
    let payments_enabled = publishable_key.is_some() && state.services.payments_enabled;

    Json(ClientConfig {
        payments_message: (!payments_enabled).then(|| {
            "Online payment is temporarily unavailable. Please contact us to complete your order."
                .to_string()
        }),
        bot_protection_enabled: turnstile_site_key.is_some(),
        bot_protection_message: turnstile_site_key
            .is_none()
            .then(|| "Form verification is unavailable; forms are disabled.".to_string()),
        publishable_key,
        payments_enabled,
        turnstile_site_key,
        currency: config.currency.clone(),
        checkout_debounce_ms: config.checkout_debounce_ms,
    })
}
