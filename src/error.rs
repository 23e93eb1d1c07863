use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Everything a request can fail with. All of these are expected, recoverable
/// conditions reported back to the caller; only [`AppError::Database`] maps to
/// a 500.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("this action is not available in the current contest phase")]
    WrongPhase,

    #[error("the contest has reached its entry limit")]
    CapacityReached,

    #[error("you have already submitted an entry")]
    DuplicateSubmission,

    #[error("you have already voted for this entry")]
    DuplicateVote,

    #[error("no votes left today")]
    VoteLimitReached,

    #[error("voting for your own entry is not allowed")]
    SelfVoteForbidden,

    #[error("entry not found")]
    EntryNotFound,

    #[error("invalid image: {0}")]
    InvalidImage(&'static str),

    #[error("image upload failed")]
    UploadFailed(#[source] std::io::Error),

    #[error("results are not available until the contest closes")]
    ResultsNotAvailable,

    #[error("the contest cannot change phase this way")]
    InvalidPhaseTransition,

    #[error("admin authorization required")]
    Unauthorized,

    #[error("internal error")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::WrongPhase
            | AppError::CapacityReached
            | AppError::DuplicateSubmission
            | AppError::DuplicateVote
            | AppError::ResultsNotAvailable
            | AppError::InvalidPhaseTransition => StatusCode::CONFLICT,
            AppError::VoteLimitReached => StatusCode::TOO_MANY_REQUESTS,
            AppError::SelfVoteForbidden => StatusCode::FORBIDDEN,
            AppError::EntryNotFound => StatusCode::NOT_FOUND,
            AppError::InvalidImage(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UploadFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("request failed: {self:?}");
        }

        (status, self.to_string()).into_response()
    }
}
