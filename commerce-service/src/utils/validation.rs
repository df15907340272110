use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use service_core::error::AppError;
use validator::Validate;

/// JSON body that is deserialized and validated before the handler runs.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::invalid_data(format!("Invalid request body: {}", e.body_text())))?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}

/// Lenient JSON body for provider routes: empty bodies read as `{}`.
pub struct JsonBody(pub Value);

#[axum::async_trait]
impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::invalid_data(format!("Invalid request body: {}", e.body_text())))?;

        parse_json_body(&bytes).map(JsonBody)
    }
}

pub fn parse_json_body(bytes: &[u8]) -> Result<Value, AppError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(bytes)
        .map_err(|e| AppError::invalid_data(format!("Invalid request body: {}", e)))
}

/// Non-empty string field of a JSON object.
pub fn string_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_body_is_an_empty_object() {
        assert_eq!(parse_json_body(b"").unwrap(), json!({}));
        assert_eq!(parse_json_body(b" \n").unwrap(), json!({}));
    }

    #[test]
    fn malformed_body_is_invalid_data() {
        let err = parse_json_body(b"{not json").unwrap_err();
        assert_eq!(err.kind(), "invalid_data");
    }

    #[test]
    fn string_field_skips_blank_and_non_strings() {
        let body = json!({ "email": "  ", "password": 42, "name": " Ann " });
        assert_eq!(string_field(&body, "email"), None);
        assert_eq!(string_field(&body, "password"), None);
        assert_eq!(string_field(&body, "name"), Some("Ann"));
    }
}
