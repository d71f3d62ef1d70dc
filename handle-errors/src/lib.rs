use warp::{
    Rejection, Reply,
    filters::{body::BodyDeserializeError, cors::CorsForbidden},
    http::StatusCode,
    reject::Reject,
};

use reqwest::Error as ReqwestError;

use tracing::{Level, event, instrument};

#[derive(Debug)]
pub enum Error {
    MissingParameters,
    InvalidQuizStructure(String),
    QuizNotFound,
    CannotDecryptToken,
    CannotIssueToken,
    Unauthorized,
    DatabaseQueryError(sqlx::Error),
    Internal {
        message: String,
        trace: Option<String>, // 설정에서 허용한 경우에만 채워진다.
    },
    ReqwestAPIError(ReqwestError),
    Connectivity(String), // AnkiConnect 리스너에 닿지 못한 경우
    Protocol(String),     // AnkiConnect가 error 필드를 채워서 돌려준 경우
    Transport { status: u16 },
    Fetch { status: Option<u16>, message: String }, // 앱 서버에서 퀴즈를 가져오지 못한 경우
    ConfigError(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::MissingParameters => {
                write!(f, "Missing required parameters")
            }
            Error::InvalidQuizStructure(reason) => {
                write!(f, "Invalid quiz structure: {}", reason)
            }
            Error::QuizNotFound => {
                write!(f, "Quiz not found")
            }
            Error::CannotDecryptToken => {
                write!(f, "Cannot decrypt token")
            }
            Error::CannotIssueToken => {
                write!(f, "Cannot issue token")
            }
            Error::Unauthorized => {
                write!(f, "Unauthorized")
            }
            Error::DatabaseQueryError(_) => {
                write!(f, "Cannot query data")
            }
            Error::Internal { message, trace } => match trace {
                Some(trace) => write!(f, "Internal server error: {}\n{}", message, trace),
                None => write!(f, "Internal server error: {}", message),
            },
            Error::ReqwestAPIError(err) => {
                write!(f, "External API error: {}", err)
            }
            Error::Connectivity(message) => {
                write!(f, "{}", message)
            }
            Error::Protocol(message) => {
                write!(f, "AnkiConnect error: {}", message)
            }
            Error::Transport { status } => {
                write!(f, "HTTP error! status: {}", status)
            }
            Error::Fetch { status, message } => match status {
                Some(status) => write!(f, "{} (status: {})", message, status),
                None => write!(f, "{}", message),
            },
            Error::ConfigError(message) => {
                write!(f, "Configuration error: {}", message)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DatabaseQueryError(err) => Some(err),
            Error::ReqwestAPIError(err) => Some(err),
            _ => None,
        }
    }
}

impl Reject for Error {}

#[instrument]
pub async fn return_error(r: Rejection) -> Result<impl Reply, Rejection> {
    if let Some(crate::Error::Unauthorized) | Some(crate::Error::CannotDecryptToken) =
        r.find::<Error>()
    {
        event!(Level::WARN, "Request without a valid session");
        Ok(warp::reply::with_status(
            "Unauthorized".to_string(),
            StatusCode::UNAUTHORIZED,
        ))
    } else if let Some(error @ crate::Error::MissingParameters) = r.find() {
        event!(Level::WARN, "{}", error);
        Ok(warp::reply::with_status(
            error.to_string(),
            StatusCode::BAD_REQUEST,
        ))
    } else if let Some(error @ crate::Error::InvalidQuizStructure(_)) = r.find() {
        event!(Level::WARN, "{}", error);
        Ok(warp::reply::with_status(
            error.to_string(),
            StatusCode::BAD_REQUEST,
        ))
    } else if let Some(crate::Error::QuizNotFound) = r.find() {
        // 다른 사용자의 퀴즈인지 여부는 드러내지 않는다.
        event!(Level::INFO, "Quiz lookup returned nothing");
        Ok(warp::reply::with_status(
            crate::Error::QuizNotFound.to_string(),
            StatusCode::NOT_FOUND,
        ))
    } else if let Some(error @ crate::Error::Internal { message, .. }) = r.find() {
        event!(Level::ERROR, message = %message, "Unexpected failure");
        Ok(warp::reply::with_status(
            error.to_string(),
            StatusCode::INTERNAL_SERVER_ERROR,
        ))
    } else if let Some(error) = r.find::<CorsForbidden>() {
        event!(Level::ERROR, "CORS forbidden error: {}", error);
        Ok(warp::reply::with_status(
            error.to_string(),
            StatusCode::FORBIDDEN,
        ))
    } else if let Some(error) = r.find::<BodyDeserializeError>() {
        event!(Level::ERROR, "Cannot deserialize request body: {}", error);
        Ok(warp::reply::with_status(
            crate::Error::MissingParameters.to_string(),
            StatusCode::BAD_REQUEST,
        ))
    } else if let Some(error) = r.find::<Error>() {
        event!(Level::ERROR, "{}", error);
        Ok(warp::reply::with_status(
            "Internal Server Error".to_string(),
            StatusCode::INTERNAL_SERVER_ERROR,
        ))
    } else {
        event!(Level::WARN, "Requested route was not found");
        Ok(warp::reply::with_status(
            "Route not found".to_string(),
            StatusCode::NOT_FOUND,
        ))
    }
}
