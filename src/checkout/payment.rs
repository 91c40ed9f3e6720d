use super::{api::CheckoutApiError, flow::CheckoutView};
use crate::services::stripe::StripePaymentIntent;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{info, instrument, warn};
use url::Url;

/// Result of confirming a payment with the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Succeeded { payment_intent_id: String },
    /// An extra step (3-D Secure and the like) happens at this URL
    RequiresAction { redirect_url: String },
    Failed { message: String },
}

/// The embedded payment form's confirmation call.
#[async_trait]
pub trait PaymentConfirmer: Send + Sync {
    async fn confirm(&self, client_secret: &str, return_url: &str) -> ConfirmOutcome;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentFormState {
    Ready,
    Submitting,
    Redirecting(String),
    /// Message shown inline; the form can be submitted again
    Failed(String),
    Succeeded(String),
}

/// Return URL carrying the intent id to the confirmation page
pub fn return_url(site_url: &Url, payment_intent_id: &str) -> Option<String> {
    let mut url = site_url.join("/order-confirmation").ok()?;
    url.query_pairs_mut()
        .append_pair("payment_intent", payment_intent_id);
    Some(url.to_string())
}

/// Payment step of the checkout. Reads the client secret from the live
/// session view at submit time, so a refreshed secret is used without
/// rebuilding the form.
pub struct PaymentForm {
    confirmer: Arc<dyn PaymentConfirmer>,
    view: watch::Receiver<CheckoutView>,
    site_url: Url,
    state: PaymentFormState,
}

impl PaymentForm {
    pub fn new(
        confirmer: Arc<dyn PaymentConfirmer>,
        view: watch::Receiver<CheckoutView>,
        site_url: Url,
    ) -> Self {
        Self {
            confirmer,
            view,
            site_url,
            state: PaymentFormState::Ready,
        }
    }

    pub fn state(&self) -> &PaymentFormState {
        &self.state
    }

    pub fn can_submit(&self) -> bool {
        let view = self.view.borrow();
        view.client_secret.is_some()
            && matches!(
                self.state,
                PaymentFormState::Ready | PaymentFormState::Failed(_)
            )
    }

    #[instrument(skip(self))]
    pub async fn submit(&mut self) -> &PaymentFormState {
        if matches!(
            self.state,
            PaymentFormState::Succeeded(_) | PaymentFormState::Redirecting(_)
        ) {
            return &self.state;
        }

        let (client_secret, payment_intent_id) = {
            let view = self.view.borrow();
            (view.client_secret.clone(), view.payment_intent_id.clone())
        };
        let (Some(client_secret), Some(payment_intent_id)) = (client_secret, payment_intent_id)
        else {
            self.state = PaymentFormState::Failed("Payment is not ready yet".to_string());
            return &self.state;
        };
        let Some(return_url) = return_url(&self.site_url, &payment_intent_id) else {
            self.state = PaymentFormState::Failed("Payment is not ready yet".to_string());
            return &self.state;
        };

        self.state = PaymentFormState::Submitting;
        self.state = match self.confirmer.confirm(&client_secret, &return_url).await {
            ConfirmOutcome::Succeeded { payment_intent_id } => {
                info!(%payment_intent_id, "payment confirmed");
                PaymentFormState::Succeeded(payment_intent_id)
            }
            ConfirmOutcome::RequiresAction { redirect_url } => {
                PaymentFormState::Redirecting(redirect_url)
            }
            ConfirmOutcome::Failed { message } => {
                warn!(%message, "payment confirmation failed");
                PaymentFormState::Failed(message)
            }
        };
        &self.state
    }
}

#[derive(Debug, Deserialize)]
struct ConfirmErrorBody {
    error: ConfirmError,
}

#[derive(Debug, Deserialize)]
struct ConfirmError {
    message: Option<String>,
}

/// Confirms with Stripe's publishable-key endpoint using an already collected payment method.
#[derive(Clone)]
pub struct StripeConfirmer {
    publishable_key: String,
    payment_method: String,
    api_base: Url,
    client: reqwest::Client,
}

impl StripeConfirmer {
    pub fn new(
        publishable_key: impl Into<String>,
        payment_method: impl Into<String>,
        api_base: &str,
        timeout: Duration,
    ) -> Result<Self, CheckoutApiError> {
        let api_base = Url::parse(api_base)
            .map_err(|e| CheckoutApiError::Transport(format!("invalid Stripe API base: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CheckoutApiError::Transport(e.to_string()))?;
        Ok(Self {
            publishable_key: publishable_key.into(),
            payment_method: payment_method.into(),
            api_base,
            client,
        })
    }

    fn confirm_url(&self, payment_intent_id: &str) -> Option<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(["v1", "payment_intents", payment_intent_id, "confirm"]);
        Some(url)
    }
}

/// `pi_123_secret_abc` → `pi_123`
fn intent_id_from_secret(client_secret: &str) -> Option<&str> {
    client_secret
        .split_once("_secret_")
        .map(|(id, _)| id)
        .filter(|id| id.starts_with("pi_"))
}

fn outcome_from_intent(intent: StripePaymentIntent) -> ConfirmOutcome {
    match intent.status.as_str() {
        "succeeded" | "processing" => ConfirmOutcome::Succeeded {
            payment_intent_id: intent.id,
        },
        "requires_action" => {
            match intent
                .next_action
                .as_ref()
                .and_then(|action| action.pointer("/redirect_to_url/url"))
                .and_then(|url| url.as_str())
            {
                Some(url) => ConfirmOutcome::RequiresAction {
                    redirect_url: url.to_string(),
                },
                None => ConfirmOutcome::Failed {
                    message: "Additional authentication is required".to_string(),
                },
            }
        }
        _ => ConfirmOutcome::Failed {
            message: intent
                .last_payment_error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "Your payment could not be completed".to_string()),
        },
    }
}

#[async_trait]
impl PaymentConfirmer for StripeConfirmer {
    async fn confirm(&self, client_secret: &str, return_url: &str) -> ConfirmOutcome {
        let Some(url) = intent_id_from_secret(client_secret).and_then(|id| self.confirm_url(id))
        else {
            return ConfirmOutcome::Failed {
                message: "Invalid payment session".to_string(),
            };
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.publishable_key)
            .form(&[
                ("client_secret", client_secret),
                ("return_url", return_url),
                ("payment_method", self.payment_method.as_str()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "payment confirmation request failed");
                return ConfirmOutcome::Failed {
                    message: "We couldn't reach the payment provider. Please try again."
                        .to_string(),
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ConfirmErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| match status {
                    StatusCode::PAYMENT_REQUIRED => "Your card was declined".to_string(),
                    _ => "Your payment could not be completed".to_string(),
                });
            return ConfirmOutcome::Failed { message };
        }

        match response.json::<StripePaymentIntent>().await {
            Ok(intent) => outcome_from_intent(intent),
            Err(err) => {
                warn!(error = %err, "unreadable confirmation response");
                ConfirmOutcome::Failed {
                    message: "Your payment could not be completed".to_string(),
                }
            }
        }
    }
}
