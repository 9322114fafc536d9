use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::Error;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
            Self::InvalidCredentials | Self::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
            }
            Self::Provider { .. } => {
                tracing::warn!(error = %self, "Identity provider error");
                (StatusCode::BAD_GATEWAY, "Identity provider error").into_response()
            }
            #[cfg(feature = "http")]
            Self::Http(_) => {
                tracing::warn!(error = %self, "Identity provider unreachable");
                (StatusCode::BAD_GATEWAY, "Identity provider error").into_response()
            }
            Self::Config(_) | Self::Storage(_) => {
                tracing::error!(error = %self, "Auth internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (Error::Validation("bad email".into()), StatusCode::BAD_REQUEST),
            (Error::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (Error::Unauthenticated, StatusCode::UNAUTHORIZED),
            (Error::provider("sign in", Some(503), "down"), StatusCode::BAD_GATEWAY),
            (Error::Config("missing".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::Storage("unencodable".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
