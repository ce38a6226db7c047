//! Error handler for binwise.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::ValidationErrors;

use crate::domain::{DomainError, UserId};

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),
    #[error(transparent)]
    Query(#[from] QueryRejection),

    #[error("SQL request failed: {0}")]
    Sql(#[from] sqlx::Error),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("user already exists")]
    UserExists,
    #[error("user {0} is referenced by disposal records and cannot be deleted")]
    UserReferenced(UserId),

    #[error("invalid or expired token")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("invalid 'Authorization' header")]
    Unauthorized,
}

impl ServerError {
    /// HTTP status matching this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Axum(_) | Self::Query(_) => {
                StatusCode::BAD_REQUEST
            },
            Self::Domain(err) => domain_status(err),
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Sql(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            Self::UserExists | Self::UserReferenced(_) => StatusCode::CONFLICT,
            Self::Token(_) | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Sql(_) | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::RoleNotSupported { .. } => StatusCode::FORBIDDEN,
        DomainError::BagAlreadyUsed(_)
        | DomainError::BagAlreadyChecked(_)
        | DomainError::BagNotUsed(_)
        | DomainError::OwnerMismatch { .. } => StatusCode::CONFLICT,
        DomainError::DisposalLimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,
        DomainError::InsufficientScore { .. }
        | DomainError::InsufficientStock { .. }
        | DomainError::StockOverflow { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        },
        DomainError::NoActiveSession => StatusCode::UNAUTHORIZED,
        DomainError::InvalidQuantity
        | DomainError::InvalidStanding { .. }
        | DomainError::InvalidCategory(_)
        | DomainError::InvalidPayload
        | DomainError::InvalidIdFormat
        | DomainError::InvalidRole(_)
        | DomainError::MissingIntent(_) => StatusCode::BAD_REQUEST,
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseError {
    r#type: Option<String>,
    pub title: String,
    pub status: u16,
    pub detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(self) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let response = ResponseError::default()
            .title("The request could not be completed.")
            .details(&self.to_string())
            .status(status);

        let response = match &self {
            ServerError::Validation(validation_errors) => response
                .title("There were validation errors with your request.")
                .errors(validation_errors),

            ServerError::Domain(_) => {
                response.title("Operation rejected.")
            },

            ServerError::Unauthorized | ServerError::Token(_) => response
                .title("Missing or invalid 'Authorization' header."),

            ServerError::Sql(err) if status.is_server_error() => {
                tracing::error!(error = %err, "database request failed");
                ResponseError::default()
            },

            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");
                ResponseError::default()
            },

            _ => response,
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
