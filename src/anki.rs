//! AnkiConnect 로컬 자동화 API 클라이언트.
//!
//! AnkiConnect는 데스크톱의 Anki 안에서 평문 HTTP로만 동작한다.
//! 모든 요청은 `{ action, version: 6, params }` 모양으로 보낸다.

use std::future::Future;

use handle_errors::Error;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{Level, Span, event};

use crate::types::note::Note;
use crate::types::quiz::Quiz;

pub const DEFAULT_ANKI_URL: &str = "http://127.0.0.1:8765";
pub const ANKI_CONNECT_VERSION: u8 = 6;

const SECURE_CONTEXT_MESSAGE: &str = "Cannot reach AnkiConnect from a secure (HTTPS) page. \
Browsers block requests from HTTPS pages to the plain-HTTP AnkiConnect listener (mixed content). \
Allow insecure content for this site in your browser's site settings, then try again. \
Anki must be running with the AnkiConnect add-on installed.";

const LISTENER_MESSAGE: &str = "Cannot reach AnkiConnect. Anki must be running on this computer \
with the AnkiConnect add-on installed. AnkiConnect only listens on the desktop where Anki runs, \
so it is not reachable from mobile devices.";

const NOT_RUNNING_MESSAGE: &str = "Cannot connect to Anki. Anki must be running with the \
AnkiConnect add-on installed.";

#[derive(Serialize, Debug)]
struct AnkiRequest<'a> {
    action: &'a str,
    version: u8,
    params: serde_json::Value,
}

#[derive(Deserialize, Debug)]
struct AnkiResponse {
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

/// 내보내기 한 번의 결과.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub success: bool,
    pub added_notes: usize,
    pub message: String,
}

/// Anki를 다룰 수 있는 실행 환경에서만 주입되는 기능.
pub trait LocalAutomation: Send + Sync {
    fn test_connection(&self) -> impl Future<Output = bool> + Send;

    fn create_deck(&self, name: &str) -> impl Future<Output = Result<Option<i64>, Error>> + Send;

    fn add_notes(
        &self,
        notes: &[Note],
    ) -> impl Future<Output = Result<Vec<Option<i64>>, Error>> + Send;

    /// 연결 확인에 실패했을 때 사용자에게 보여줄 안내문.
    fn unreachable_message(&self) -> String {
        NOT_RUNNING_MESSAGE.to_string()
    }

    /// 연결 확인 → 덱 생성 → 노트 추가 순서로 진행한다.
    /// 어느 단계든 실패하면 남은 단계는 실행하지 않고 에러를 그대로 돌려준다.
    /// 덱을 만든 뒤 노트 추가가 실패해도 덱은 되돌리지 않는다.
    fn send_quiz_to_anki(
        &self,
        quiz: &Quiz,
        deck_name: &str,
    ) -> impl Future<Output = Result<ExportSummary, Error>> + Send {
        async move {
            if !self.test_connection().await {
                return Err(Error::Connectivity(self.unreachable_message()));
            }

            let notes = quiz.to_notes(deck_name)?;
            self.create_deck(deck_name).await?;
            let results = self.add_notes(&notes).await?;

            Ok(ExportSummary {
                success: true,
                added_notes: results.len(),
                message: format!(
                    "Successfully added {} cards to deck \"{}\"",
                    results.len(),
                    deck_name
                ),
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnkiClient {
    client: reqwest::Client,
    endpoint: Url,
    secure_context: bool,
    span: Span,
}

impl AnkiClient {
    /// `secure_context`는 호출하는 웹 앱이 https로 제공되는지를 뜻한다.
    pub fn new(endpoint: Url, secure_context: bool) -> Self {
        let span = tracing::info_span!("anki_client", endpoint = %endpoint);
        // 리스너는 항상 로컬이므로 시스템 프록시를 거치지 않는다.
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_default();
        AnkiClient {
            client,
            endpoint,
            secure_context,
            span,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    fn connectivity_message(&self) -> &'static str {
        if self.secure_context {
            SECURE_CONTEXT_MESSAGE
        } else {
            LISTENER_MESSAGE
        }
    }

    pub async fn invoke<T: DeserializeOwned>(
        &self,
        action: &str,
        params: serde_json::Value,
    ) -> Result<T, Error> {
        event!(parent: &self.span, Level::DEBUG, action, "invoking AnkiConnect");

        let res = self
            .client
            .post(self.endpoint.clone())
            .json(&AnkiRequest {
                action,
                version: ANKI_CONNECT_VERSION,
                params,
            })
            .send()
            .await
            .map_err(|e| {
                event!(parent: &self.span, Level::WARN, action, error = %e, "AnkiConnect unreachable");
                Error::Connectivity(self.connectivity_message().to_string())
            })?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            event!(parent: &self.span, Level::ERROR, action, status, "AnkiConnect returned an HTTP error");
            return Err(Error::Transport { status });
        }

        let body = res
            .json::<AnkiResponse>()
            .await
            .map_err(|e| Error::Protocol(format!("invalid response to {}: {}", action, e)))?;

        if let Some(error) = body.error.filter(|e| !e.is_empty()) {
            event!(parent: &self.span, Level::ERROR, action, error = %error, "AnkiConnect reported an error");
            return Err(Error::Protocol(error));
        }

        serde_json::from_value(body.result)
            .map_err(|e| Error::Protocol(format!("unexpected result for {}: {}", action, e)))
    }
}

impl LocalAutomation for AnkiClient {
    fn unreachable_message(&self) -> String {
        self.connectivity_message().to_string()
    }

    async fn test_connection(&self) -> bool {
        match self.invoke::<serde_json::Value>("version", json!({})).await {
            Ok(version) => {
                event!(parent: &self.span, Level::DEBUG, version = %version, "AnkiConnect is reachable");
                true
            }
            Err(e) => {
                event!(parent: &self.span, Level::WARN, error = %e, "AnkiConnect connection test failed");
                false
            }
        }
    }

    async fn create_deck(&self, name: &str) -> Result<Option<i64>, Error> {
        let deck_id = self.invoke("createDeck", json!({ "deck": name })).await?;
        event!(parent: &self.span, Level::INFO, deck = name, "deck ensured");
        Ok(deck_id)
    }

    async fn add_notes(&self, notes: &[Note]) -> Result<Vec<Option<i64>>, Error> {
        let results: Vec<Option<i64>> = self.invoke("addNotes", json!({ "notes": notes })).await?;
        event!(
            parent: &self.span,
            Level::INFO,
            submitted = notes.len(),
            added = results.iter().filter(|id| id.is_some()).count(),
            "notes submitted"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::quiz::{Question, QuizId, UserId};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warp::Filter;
    use warp::http::StatusCode;

    fn quiz() -> Quiz {
        Quiz {
            id: QuizId("q1".to_string()),
            user_id: UserId("u1".to_string()),
            questions: vec![
                Question::MultipleChoice {
                    prompt: "Which keyword declares a constant?".to_string(),
                    options: vec!["let".to_string(), "const".to_string(), "static".to_string()],
                    correct_answer: "const".to_string(),
                    extra: Default::default(),
                },
                Question::ShortAnswer {
                    prompt: "What does `?` do?".to_string(),
                    kind: "short_answer".to_string(),
                    correct_answer: "Propagates errors".to_string(),
                    extra: Default::default(),
                },
            ],
        }
    }

    /// 요청을 기록하는 가짜 AnkiConnect 리스너를 임의 포트에 띄운다.
    fn fake_anki(
        respond: impl Fn(&serde_json::Value) -> (StatusCode, serde_json::Value)
        + Clone
        + Send
        + Sync
        + 'static,
    ) -> (SocketAddr, Arc<std::sync::Mutex<Vec<serde_json::Value>>>) {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = seen.clone();
        let route = warp::post()
            .and(warp::body::json())
            .map(move |req: serde_json::Value| {
                log.lock().unwrap().push(req.clone());
                let (status, body) = respond(&req);
                warp::reply::with_status(warp::reply::json(&body), status)
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        (addr, seen)
    }

    fn client_for(addr: SocketAddr, secure_context: bool) -> AnkiClient {
        AnkiClient::new(
            Url::parse(&format!("http://{}", addr)).unwrap(),
            secure_context,
        )
    }

    fn closed_port() -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    #[tokio::test]
    async fn sends_versioned_envelope() {
        let (addr, seen) = fake_anki(|_| (StatusCode::OK, json!({ "result": 6, "error": null })));
        let client = client_for(addr, false);

        let version: i64 = client.invoke("version", json!({})).await.unwrap();

        assert_eq!(version, 6);
        assert_eq!(
            seen.lock().unwrap()[0],
            json!({ "action": "version", "version": 6, "params": {} })
        );
    }

    #[tokio::test]
    async fn error_field_is_protocol_error() {
        let (addr, _) = fake_anki(|_| {
            (
                StatusCode::OK,
                json!({ "result": null, "error": "model was not found: Basic" }),
            )
        });
        let client = client_for(addr, false);

        match client.invoke::<serde_json::Value>("addNotes", json!({})).await {
            Err(Error::Protocol(message)) => assert_eq!(message, "model was not found: Basic"),
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_error_field_is_not_an_error() {
        let (addr, _) = fake_anki(|_| (StatusCode::OK, json!({ "result": 1, "error": "" })));
        let client = client_for(addr, false);

        let result: i64 = client.invoke("createDeck", json!({ "deck": "D" })).await.unwrap();
        assert_eq!(result, 1);
    }

    #[tokio::test]
    async fn http_failure_is_transport_error() {
        let (addr, _) = fake_anki(|_| (StatusCode::SERVICE_UNAVAILABLE, json!({})));
        let client = client_for(addr, false);

        assert!(matches!(
            client.invoke::<serde_json::Value>("version", json!({})).await,
            Err(Error::Transport { status: 503 })
        ));
    }

    #[tokio::test]
    async fn unreachable_listener_message_depends_on_context() {
        let addr = closed_port();

        match client_for(addr, false).invoke::<serde_json::Value>("version", json!({})).await {
            Err(Error::Connectivity(message)) => {
                assert!(message.contains("Anki must be running"));
                assert!(message.contains("mobile"));
            }
            other => panic!("expected connectivity error, got {:?}", other),
        }

        match client_for(addr, true).invoke::<serde_json::Value>("version", json!({})).await {
            Err(Error::Connectivity(message)) => {
                assert!(message.contains("mixed content"));
                assert!(message.contains("Allow insecure content"));
            }
            other => panic!("expected connectivity error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn export_from_secure_page_explains_mixed_content() {
        match client_for(closed_port(), true).send_quiz_to_anki(&quiz(), "Deck1").await {
            Err(Error::Connectivity(message)) => {
                assert!(message.contains("mixed content"));
                assert!(message.contains("Anki must be running"));
            }
            other => panic!("expected connectivity error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn invokes_under_injected_span() {
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::fmt().with_test_writer().finish(),
        );
        let (addr, _) = fake_anki(|_| (StatusCode::OK, json!({ "result": 6, "error": null })));
        let client = client_for(addr, false).with_span(tracing::info_span!("export_job"));

        assert_eq!(client.span.metadata().map(|m| m.name()), Some("export_job"));
        assert!(client.test_connection().await);
    }

    #[tokio::test]
    async fn test_connection_never_fails() {
        assert!(!client_for(closed_port(), false).test_connection().await);

        let (addr, _) = fake_anki(|_| (StatusCode::OK, json!({ "result": 6, "error": null })));
        assert!(client_for(addr, false).test_connection().await);
    }

    #[tokio::test]
    async fn exports_quiz_in_order() {
        let (addr, seen) = fake_anki(|req| {
            let result = match req["action"].as_str() {
                Some("version") => json!(6),
                Some("createDeck") => json!(1651445861967i64),
                Some("addNotes") => json!([1496198395707i64, null]),
                _ => json!(null),
            };
            (StatusCode::OK, json!({ "result": result, "error": null }))
        });
        let client = client_for(addr, false);

        let summary = client.send_quiz_to_anki(&quiz(), "Rust::Basics").await.unwrap();

        assert!(summary.success);
        // 결과 목록 길이를 그대로 센다. null(추가 실패)도 포함한다.
        assert_eq!(summary.added_notes, 2);
        assert!(summary.message.contains("Rust::Basics"));

        let seen = seen.lock().unwrap();
        let actions: Vec<_> = seen.iter().map(|r| r["action"].clone()).collect();
        assert_eq!(actions, vec![json!("version"), json!("createDeck"), json!("addNotes")]);
        assert_eq!(seen[1]["params"], json!({ "deck": "Rust::Basics" }));

        let notes = seen[2]["params"]["notes"].as_array().unwrap();
        assert_eq!(notes.len(), 2);
        assert!(
            notes[0]["fields"]["Front"]
                .as_str()
                .unwrap()
                .ends_with("a) let<br>b) const<br>c) static")
        );
        assert_eq!(notes[1]["fields"]["Back"], json!("Propagates errors"));
        assert_eq!(notes[1]["tags"], json!(["quiz-q1", "quiz-anki"]));
    }

    #[tokio::test]
    async fn add_notes_failure_is_not_swallowed() {
        let (addr, _) = fake_anki(|req| match req["action"].as_str() {
            Some("addNotes") => (
                StatusCode::OK,
                json!({ "result": null, "error": "cannot create note because it is a duplicate" }),
            ),
            _ => (StatusCode::OK, json!({ "result": 1, "error": null })),
        });
        let client = client_for(addr, false);

        assert!(matches!(
            client.send_quiz_to_anki(&quiz(), "Deck").await,
            Err(Error::Protocol(_))
        ));
    }

    #[derive(Default)]
    struct Offline {
        create_deck_calls: AtomicUsize,
        add_notes_calls: AtomicUsize,
    }

    impl LocalAutomation for Offline {
        async fn test_connection(&self) -> bool {
            false
        }

        async fn create_deck(&self, _name: &str) -> Result<Option<i64>, Error> {
            self.create_deck_calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn add_notes(&self, notes: &[Note]) -> Result<Vec<Option<i64>>, Error> {
            self.add_notes_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![None; notes.len()])
        }
    }

    #[tokio::test]
    async fn fails_fast_when_anki_is_not_running() {
        let offline = Offline::default();

        match offline.send_quiz_to_anki(&quiz(), "Deck1").await {
            Err(Error::Connectivity(message)) => assert!(message.contains("Anki must be running")),
            other => panic!("expected connectivity error, got {:?}", other),
        }
        assert_eq!(offline.create_deck_calls.load(Ordering::SeqCst), 0);
        assert_eq!(offline.add_notes_calls.load(Ordering::SeqCst), 0);
    }
}
