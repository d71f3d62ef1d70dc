use handle_errors::Error;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tracing::{Level, Span, event};

use crate::anki::{ExportSummary, LocalAutomation};
use crate::types::quiz::Quiz;

#[derive(Deserialize, Debug)]
struct FetchQuizBody {
    #[serde(default)]
    quiz: Option<Quiz>,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// 앱 서버의 퀴즈 조회 엔드포인트를 호출하는 클라이언트.
#[derive(Debug, Clone)]
pub struct QuizApiClient {
    client: reqwest::Client,
    base_url: Url,
    token: String,
    span: Span,
}

impl QuizApiClient {
    pub fn new(base_url: Url, token: String) -> Self {
        let span = tracing::info_span!("quiz_api", base_url = %base_url);
        QuizApiClient {
            client: reqwest::Client::new(),
            base_url,
            token,
            span,
        }
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// 앱이 https로 제공되면 브라우저의 혼합 콘텐츠 차단을 받는다.
    pub fn is_secure_context(&self) -> bool {
        self.base_url.scheme() == "https"
    }

    // base_url의 경로는 그대로 두고 끝에 quiz 세그먼트만 붙인다.
    fn quiz_url(&self) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::ConfigError(format!("invalid api_url: {}", self.base_url)))?
            .pop_if_empty()
            .push("quiz");
        Ok(url)
    }

    pub async fn fetch_quiz(&self, quiz_id: &str) -> Result<Quiz, Error> {
        let url = self.quiz_url()?;

        event!(parent: &self.span, Level::INFO, quiz_id, "fetching quiz");
        let res = self
            .client
            .post(url)
            .header("Authorization", &self.token)
            .json(&json!({ "quizId": quiz_id }))
            .send()
            .await
            .map_err(Error::ReqwestAPIError)?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            event!(parent: &self.span, Level::ERROR, status = status.as_u16(), body = %text, "quiz fetch failed");
            return Err(Error::Fetch {
                status: Some(status.as_u16()),
                message: error_message(&text),
            });
        }

        let body = res.json::<FetchQuizBody>().await.map_err(|e| Error::Fetch {
            status: Some(status.as_u16()),
            message: format!("Invalid response from quiz endpoint: {}", e),
        })?;

        body.quiz.ok_or_else(|| Error::Fetch {
            status: None,
            message: "Invalid response: quiz data missing".to_string(),
        })
    }
}

// 엔드포인트가 돌려준 메시지를 꺼낸다. JSON이면 message/error 필드, 아니면 본문 그대로.
fn error_message(text: &str) -> String {
    if let Ok(body) = serde_json::from_str::<ErrorBody>(text) {
        if let Some(message) = body.message.or(body.error).filter(|m| !m.is_empty()) {
            return message;
        }
    }

    let text = text.trim();
    if text.is_empty() || text.starts_with('{') {
        "Failed to fetch quiz".to_string()
    } else {
        text.to_string()
    }
}

/// 퀴즈를 가져와 Anki로 보낸다.
/// 조회 실패는 `Error::Fetch`로, Anki 쪽 실패는 받은 그대로 돌려준다.
pub async fn export_quiz<A: LocalAutomation>(
    api: &QuizApiClient,
    anki: &A,
    quiz_id: &str,
    deck_name: &str,
) -> Result<ExportSummary, Error> {
    let quiz = api.fetch_quiz(quiz_id).await?;
    anki.send_quiz_to_anki(&quiz, deck_name).await
}
