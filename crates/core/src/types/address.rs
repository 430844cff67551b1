//! Postal address used for shipping and billing.

use serde::{Deserialize, Serialize};

/// A required address field was left blank.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("address field `{0}` is required")]
pub struct AddressError(pub &'static str);

/// Shipping or billing address as the shop service expects it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub recipient_name: String,
}

impl Address {
    /// Check that every required field is non-blank.
    ///
    /// # Errors
    ///
    /// Returns the first blank required field.
    pub fn validate(&self) -> Result<(), AddressError> {
        let required = [
            ("street", &self.street),
            ("city", &self.city),
            ("state", &self.state),
            ("zipCode", &self.zip_code),
            ("country", &self.country),
            ("recipientName", &self.recipient_name),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(AddressError(name));
            }
        }
        Ok(())
    }
}
