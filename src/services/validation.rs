//! Field rules shared by request types.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::borrow::Cow;
use validator::ValidationError;

/// Letters with single inner spaces.
pub static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]+( [A-Za-z]+)*$").unwrap());
pub static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").unwrap());
pub static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{10,15}$").unwrap());
pub static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[a-zA-Z0-9\-#.,'"&\s/]+$"#).unwrap());
pub static POSTCODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\-]+$").unwrap());
pub static PRODUCT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\s\-_,.&()]+$").unwrap());
pub static NHI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9-]+$").unwrap());
pub static ALPHANUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());

static DATA_IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:image/(png|jpe?g|gif|webp|svg\+xml);base64,[A-Za-z0-9+/=]+$").unwrap());
static IMAGE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://[^\s]+\.(png|jpe?g|gif|webp|svg)(\?[^\s]*)?$").unwrap()
});

fn error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

/// Empty, an inline base64 image, or an http(s) image URL.
pub fn validate_product_image(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || DATA_IMAGE_RE.is_match(value) || IMAGE_URL_RE.is_match(value) {
        Ok(())
    } else {
        Err(error(
            "product_image",
            "Product image must be a base64 image or an image URL",
        ))
    }
}

pub fn validate_product_price(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        Err(error("product_price", "Product price must be greater than 0"))
    }
}

pub fn validate_gst_price(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        Err(error("product_gst_price", "GST price must be greater than 0"))
    }
}

pub fn trim_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Jane", true)]
    #[case("Mary Ann", true)]
    #[case("Mary  Ann", false)]
    #[case(" Jane", false)]
    #[case("J4ne", false)]
    fn name_rule(#[case] input: &str, #[case] ok: bool) {
        assert_eq!(NAME_RE.is_match(input), ok);
    }

    #[rstest]
    #[case("")]
    #[case("data:image/png;base64,iVBORw0KGgo=")]
    #[case("https://cdn.example.com/kit.JPG")]
    #[case("http://example.com/a/b.webp?v=2")]
    fn accepted_images(#[case] input: &str) {
        assert!(validate_product_image(input).is_ok());
    }

    #[rstest]
    #[case("ftp://example.com/kit.png")]
    #[case("https://example.com/kit.pdf")]
    #[case("data:text/plain;base64,aGk=")]
    fn rejected_images(#[case] input: &str) {
        assert!(validate_product_image(input).is_err());
    }

    #[test]
    fn prices_must_be_positive() {
        assert!(validate_product_price(&Decimal::ONE).is_ok());
        assert!(validate_product_price(&Decimal::ZERO).is_err());
        assert!(validate_gst_price(&Decimal::NEGATIVE_ONE).is_err());
    }
}
