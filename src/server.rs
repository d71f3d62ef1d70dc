use handle_errors::return_error;
use warp::{Filter, Reply, http::Method};

use crate::routes;
use crate::routes::quiz::Diagnostics;
use crate::store::QuizStore;
use crate::types::session::TokenKey;

/// 서버의 모든 경로를 하나의 필터로 묶는다.
pub fn routes<S: QuizStore>(
    store: S,
    key: TokenKey,
    diagnostics: Diagnostics,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    let store_filter = warp::any().map(move || store.clone());
    let diagnostics_filter = warp::any().map(move || diagnostics);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["Content-Type", "Authorization"])
        .allow_methods(&[Method::POST]);

    let fetch_quiz = warp::post()
        .and(warp::path("quiz"))
        .and(warp::path::end())
        .and(routes::authentication::auth(key))
        .and(store_filter)
        .and(diagnostics_filter)
        .and(warp::body::json())
        .and_then(routes::quiz::fetch_quiz::<S>)
        .with(warp::trace(|info| {
            tracing::info_span!(
                "fetch_quiz request",
                method = %info.method(),
                path = %info.path(),
                id = %uuid::Uuid::new_v4(),
            )
        }));

    fetch_quiz
        .with(cors)
        .with(warp::trace::request())
        .recover(return_error)
}

pub async fn serve<S: QuizStore>(store: S, key: TokenKey, diagnostics: Diagnostics, port: u16) {
    tracing::info!(port, "serving quiz endpoint");
    warp::serve(routes(store, key, diagnostics))
        .run(([127, 0, 0, 1], port))
        .await;
}
