use crate::middleware_helpers::sanitize::sanitize_email;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

/// Maximum email length accepted by the fulfillment integration.
pub const MAX_EMAIL_LENGTH: u64 = 50;

const UNSUPPORTED_EMAIL_CHARACTERS: &str =
    "Email may only contain letters, digits, @ and . _ + -";

/// Destination countries the store ships to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
pub enum Country {
    #[default]
    US,
    CA,
}

/// Editable shipping form state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ShippingAddress {
    pub name: String,
    #[validate(
        email(message = "Enter a valid email address"),
        length(max = 50, message = "Email must be 50 characters or fewer")
    )]
    pub email: String,
    pub line1: String,
    #[serde(default)]
    pub line2: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    #[serde(default)]
    pub country: Country,
}

/// Which form field an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressField {
    Name,
    Email,
    Line1,
    Line2,
    City,
    State,
    Zip,
}

impl ShippingAddress {
    /// Every required field (all but `line2`) is non-empty after trimming.
    pub fn is_complete(&self) -> bool {
        [
            &self.name,
            &self.email,
            &self.line1,
            &self.city,
            &self.state,
            &self.zip,
        ]
        .iter()
        .all(|field| !field.trim().is_empty())
    }

    /// City, state and zip are all present, so a shipping quote can be requested.
    pub fn has_destination(&self) -> bool {
        let (city, state, zip) = self.destination_key();
        !city.is_empty() && !state.is_empty() && !zip.is_empty()
    }

    /// Trimmed (city, state, zip) triple; a change here re-triggers shipping.
    pub fn destination_key(&self) -> (String, String, String) {
        (
            self.city.trim().to_string(),
            self.state.trim().to_string(),
            self.zip.trim().to_string(),
        )
    }

    /// Field-level email check: format, the 50 character limit, and no
    /// characters that sanitization would strip before the address is sent.
    pub fn email_error(&self) -> Option<String> {
        let email = self.email.trim();
        if email.is_empty() {
            return None;
        }
        let trimmed = ShippingAddress {
            email: email.to_string(),
            ..ShippingAddress::default()
        };
        if let Err(errors) = trimmed.validate() {
            return errors
                .field_errors()
                .get("email")
                .and_then(|errs| errs.first())
                .map(|err| {
                    err.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Invalid email".to_string())
                });
        }
        if sanitize_email(email) != email.to_lowercase() {
            return Some(UNSUPPORTED_EMAIL_CHARACTERS.to_string());
        }
        None
    }

    pub fn has_valid_email(&self) -> bool {
        !self.email.trim().is_empty() && self.email_error().is_none()
    }

    pub fn set(&mut self, field: AddressField, value: impl Into<String>) {
        let value = value.into();
        match field {
            AddressField::Name => self.name = value,
            AddressField::Email => self.email = value,
            AddressField::Line1 => self.line1 = value,
            AddressField::Line2 => self.line2 = value,
            AddressField::City => self.city = value,
            AddressField::State => self.state = value,
            AddressField::Zip => self.zip = value,
        }
    }
}
