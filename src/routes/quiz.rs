use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{Level, event, instrument};

use handle_errors::Error;

use crate::store::QuizStore;
use crate::types::quiz::{Quiz, QuizId};
use crate::types::session::Session;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct FetchQuizRequest {
    #[serde(default)]
    pub quiz_id: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FetchQuizResponse {
    pub success: bool,
    pub quiz: Quiz,
}

/// 500 응답에 내부 진단 정보를 실을지 여부.
#[derive(Debug, Clone, Copy, Default)]
pub struct Diagnostics {
    pub expose_details: bool,
}

#[instrument(skip(store))]
pub async fn fetch_quiz<S: QuizStore>(
    session: Session,
    store: S,
    diagnostics: Diagnostics,
    request: FetchQuizRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    // 핸들러나 저장소에서 패닉이 나도 응답 없이 연결이 끊기지 않도록 잡아서 500으로 바꾼다.
    match AssertUnwindSafe(load_quiz(&session, &store, request))
        .catch_unwind()
        .await
    {
        Ok(Ok(quiz)) => Ok(warp::reply::json(&FetchQuizResponse {
            success: true,
            quiz,
        })),
        Ok(Err(e)) => Err(warp::reject::custom(e)),
        Err(panic) => {
            let detail = panic_message(&*panic);
            event!(Level::ERROR, detail = %detail, "quiz fetch panicked");
            Err(warp::reject::custom(Error::Internal {
                message: "Failed to fetch quiz".to_string(),
                trace: diagnostics.expose_details.then_some(detail),
            }))
        }
    }
}

async fn load_quiz<S: QuizStore>(
    session: &Session,
    store: &S,
    request: FetchQuizRequest,
) -> Result<Quiz, Error> {
    let quiz_id = match request.quiz_id {
        Some(id) if !id.trim().is_empty() => QuizId(id),
        _ => return Err(Error::MissingParameters),
    };

    event!(target: "quiz_anki", Level::INFO, quiz_id = %quiz_id, "fetching quiz");
    let record = match store.get_quiz(&quiz_id, &session.user_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return Err(Error::QuizNotFound),
        Err(e) => {
            // 조회 실패도 404로 돌려준다. 원인은 로그에만 남긴다.
            event!(Level::ERROR, error = %e, "quiz lookup failed");
            return Err(Error::QuizNotFound);
        }
    };

    Quiz::from_record(record)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unexpected failure".to_string()
    }
}
