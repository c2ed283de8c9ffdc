use log::*;
use tide::{Response, StatusCode};

/**
 * Errors raised by the site's own code.
 *
 * Handlers return `tide::Result`, so these travel inside a `tide::Error` and
 * are turned back into a proper status by `map_app_errors`.
 */
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("template error: {0}")]
    Template(#[from] handlebars::RenderError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mail error: {0}")]
    Mail(String),

    #[error("password hashing failed: {0}")]
    Hash(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } | Self::Database(sqlx::Error::RowNotFound) => StatusCode::NotFound,
            Self::BadRequest(_) => StatusCode::BadRequest,
            Self::Forbidden(_) => StatusCode::Forbidden,
            _ => StatusCode::InternalServerError,
        }
    }

    /// Text that is safe to hand back to the client
    fn public_message(&self) -> String {
        match self.status() {
            StatusCode::InternalServerError => "Internal Server Error".to_string(),
            _ => self.to_string(),
        }
    }
}

/**
 * After-middleware: give `AppError`s their real status code and a short body.
 */
pub async fn map_app_errors(mut res: Response) -> tide::Result {
    let mapped = res
        .downcast_error::<AppError>()
        .map(|err| (err, err.status(), err.public_message()))
        .map(|(err, status, message)| {
            if status.is_server_error() {
                error!("Request failed: {}", err);
            } else {
                debug!("Request rejected: {}", err);
            }
            (status, message)
        });

    if let Some((status, message)) = mapped {
        res.set_status(status);
        res.set_body(message);
    }
    Ok(res)
}
