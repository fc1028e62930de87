use std::sync::LazyLock;

use regex::Regex;

// Decimal value plus an optional SI / binary suffix or exponent, as accepted
// by the Kubernetes resource model. Negative quantities are rejected.
static QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(\.[0-9]+)?(m|k|Ki|M|Mi|G|Gi|T|Ti|P|Pi|E|Ei|[eE][0-9]+)?$")
        .expect("quantity pattern compiles")
});

#[derive(Debug, thiserror::Error)]
#[error("unparsable resource quantity {value:?}")]
pub struct InvalidQuantity {
    pub value: String,
}

/// Validate a resource quantity string (`100m`, `1`, `512Mi`, `2.5G`, …)
/// before it is handed to the substrate.
pub fn validate(value: &str) -> Result<(), InvalidQuantity> {
    if QUANTITY.is_match(value) {
        Ok(())
    } else {
        Err(InvalidQuantity {
            value: value.to_owned(),
        })
    }
}
