//! Random literals for scalar inputs.

use rand::distributions::Alphanumeric;
use rand::prelude::*;

const MAX_STRING_LEN: usize = 12;

/// A random alphanumeric string of 1 to 12 characters.
pub fn random_string<R: Rng + ?Sized>(rng: &mut R) -> String {
    let len = rng.gen_range(1..=MAX_STRING_LEN);
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Quote a string as a GraphQL string literal.
pub fn quote(value: &str) -> String {
    // JSON string escaping is a subset of what GraphQL accepts.
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

/// GraphQL literal for a scalar named `name`.
///
/// `Int`, `Float` and `Boolean` get a value of their own shape. `ID`,
/// `String` and custom scalars are sent as quoted strings.
pub fn random_scalar<R: Rng + ?Sized>(name: &str, rng: &mut R) -> String {
    match name {
        "Int" => rng.gen_range(-1000..=1000i32).to_string(),
        "Float" => format!("{:.3}", rng.gen_range(-1000.0..1000.0f64)),
        "Boolean" => rng.gen::<bool>().to_string(),
        _ => quote(&random_string(rng)),
    }
}
