use crate::models::ShippingAddress;
use serde::{Deserialize, Serialize};

/// Signed-in shopper, passed into the checkout as read-only context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Empty address with email and name pre-filled when known
    pub fn default_address(&self) -> ShippingAddress {
        ShippingAddress {
            email: self.email.clone().unwrap_or_default(),
            name: self.name.clone().unwrap_or_default(),
            ..ShippingAddress::default()
        }
    }
}
