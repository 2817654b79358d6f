//! Request body extraction that reports bad bodies as [Error] responses.

use axum::extract::{FromRequest, rejection::JsonRejection};

use crate::Error;

/// A JSON request body.
///
/// Works like [axum::Json], except that a body which cannot be parsed is
/// rejected with the same JSON error response as any other validation error.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct JsonBody<T>(pub T);

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("Rejected request body: {rejection}");
        Error::InvalidBody(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, http::StatusCode, routing::post};
    use axum_test::TestServer;
    use serde::Deserialize;
    use serde_json::{Value, json};

    use super::JsonBody;

    #[derive(Debug, Deserialize)]
    struct Greeting {
        name: String,
    }

    async fn greet(JsonBody(greeting): JsonBody<Greeting>) -> String {
        greeting.name
    }

    fn get_test_server() -> TestServer {
        TestServer::try_new(Router::new().route("/greet", post(greet)))
            .expect("Could not create test server.")
    }

    #[tokio::test]
    async fn valid_body_is_extracted() {
        let server = get_test_server();

        let response = server.post("/greet").json(&json!({"name": "Ada"})).await;

        response.assert_status_ok();
        response.assert_text("Ada");
    }

    #[tokio::test]
    async fn mistyped_body_is_a_json_validation_error() {
        let server = get_test_server();

        let response = server.post("/greet").json(&json!({"name": 42})).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body = response.json::<Value>();
        assert_eq!(body["code"], "validation_error");
        assert_eq!(body["retryable"], false);
    }
}
