use actix_web::HttpResponse;
use serde::Serialize;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub fields: serde_json::Value,
}

/// Flatten `validator` errors into the shared `{field: {errors: [...]}}` shape
pub fn field_errors(errors: &validator::ValidationErrors) -> serde_json::Map<String, serde_json::Value> {
    let mut fields = serde_json::Map::new();
    for (field, errors) in errors.field_errors() {
        let messages: Vec<String> = errors
            .iter()
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Validation error in field: {}", field))
            })
            .collect();
        fields.insert(field.to_string(), serde_json::json!({"errors": messages}));
    }
    fields
}

fn bad_request(error: &str, fields: serde_json::Map<String, serde_json::Value>) -> actix_web::Error {
    let error_response = ErrorResponse {
        error: error.to_string(),
        fields: serde_json::Value::Object(fields),
    };
    actix_web::error::InternalError::from_response("", HttpResponse::BadRequest().json(error_response))
        .into()
}

/// Standardized error handling for body and query extractors
fn validation_error(err: actix_web_validator::Error) -> actix_web::Error {
    let mut fields = serde_json::Map::new();

    match err {
        actix_web_validator::Error::Validate(validation_errors) => {
            bad_request("Validation failed", field_errors(&validation_errors))
        }
        actix_web_validator::Error::Deserialize(de_err) => {
            let err_string = de_err.to_string();

            let message = if err_string.contains("EOF while parsing") {
                "Request body is empty. Expected JSON payload"
            } else if err_string.contains("unknown variant") {
                "Invalid enum value. Check allowed values for this field"
            } else if err_string.contains("missing field") {
                "Missing required field"
            } else {
                "Invalid request format"
            };
            fields.insert("message".to_string(), serde_json::json!(message));

            bad_request("Request validation failed", fields)
        }
        _ => {
            fields.insert("message".to_string(), serde_json::json!("Validation error"));
            bad_request("Validation failed", fields)
        }
    }
}

/// JsonConfig with the project-wide validation error body
pub fn json_config() -> actix_web_validator::JsonConfig {
    actix_web_validator::JsonConfig::default().error_handler(|err, _req| validation_error(err))
}

/// QueryConfig with the project-wide validation error body
pub fn query_config() -> actix_web_validator::QueryConfig {
    actix_web_validator::QueryConfig::default().error_handler(|err, _req| validation_error(err))
}
