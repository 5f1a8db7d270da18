use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    crypto::DoubleCipher,
    errors::{validate_in_order, FieldOrder, ServiceError},
    services::validation::{
        trim_optional, validate_gst_price, validate_product_image, validate_product_price,
        PRODUCT_NAME_RE,
    },
};

/// Product details the storefront passes around in sealed form so the
/// checkout page cannot be tampered with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct ProductDetails {
    #[validate(
        length(min = 3, max = 100, message = "Product name must be between 3 and 100 characters"),
        regex(path = "PRODUCT_NAME_RE", message = "Product name contains invalid characters")
    )]
    pub product_name: String,
    #[validate(custom = "validate_product_price")]
    pub product_price: Decimal,
    #[validate(custom = "validate_gst_price")]
    pub product_gst_price: Decimal,
    #[validate(length(max = 1000, message = "Product description cannot exceed 1000 characters"))]
    #[serde(default)]
    pub product_description: Option<String>,
    #[validate(custom = "validate_product_image")]
    #[serde(default)]
    pub product_image: Option<String>,
}

impl FieldOrder for ProductDetails {
    const FIELD_ORDER: &'static [&'static str] = &[
        "product_name",
        "product_price",
        "product_gst_price",
        "product_description",
        "product_image",
    ];
}

impl ProductDetails {
    fn normalized(self) -> Self {
        Self {
            product_name: self.product_name.trim().to_string(),
            product_description: trim_optional(self.product_description),
            product_image: trim_optional(self.product_image),
            ..self
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Sealed {
    pub encrypted: String,
}

#[derive(Clone)]
pub struct ProductService {
    cipher: DoubleCipher,
}

impl ProductService {
    pub fn new(cipher: DoubleCipher) -> Self {
        Self { cipher }
    }

    /// Strings are sealed as-is, anything else as its JSON text.
    pub fn encrypt_value(&self, data: &Value) -> Result<Sealed, ServiceError> {
        let plain = match data {
            Value::String(s) => s.clone(),
            Value::Null => {
                return Err(ServiceError::ValidationError("Data is required".to_string()))
            }
            other => other.to_string(),
        };
        Ok(Sealed {
            encrypted: self.cipher.encrypt(&plain)?,
        })
    }

    #[instrument(skip(self, product), fields(product_name = %product.product_name))]
    pub fn encrypt_product(&self, product: ProductDetails) -> Result<Sealed, ServiceError> {
        let product = product.normalized();
        validate_in_order(&product)?;
        let json = serde_json::to_string(&product)
            .map_err(|e| ServiceError::InternalError(format!("Failed to encode product: {}", e)))?;
        Ok(Sealed {
            encrypted: self.cipher.encrypt(&json)?,
        })
    }

    /// Opens a sealed product and re-applies the product rules.
    #[instrument(skip(self, sealed))]
    pub fn verify_product(&self, sealed: &str) -> Result<ProductDetails, ServiceError> {
        let invalid = || ServiceError::BadRequest("Invalid product data".to_string());
        let json = self.cipher.decrypt(sealed).map_err(|e| {
            warn!("product payload failed to decrypt: {}", e);
            invalid()
        })?;
        let product: ProductDetails = serde_json::from_str(&json).map_err(|_| invalid())?;
        let product = product.normalized();
        validate_in_order(&product)?;
        Ok(product)
    }
}
