//! End-to-end export: quiz endpoint + fake AnkiConnect listener on ephemeral ports.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use handle_errors::Error;
use quiz_anki::anki::AnkiClient;
use quiz_anki::export::{QuizApiClient, export_quiz};
use quiz_anki::routes::authentication::issue_token;
use quiz_anki::routes::quiz::Diagnostics;
use quiz_anki::server;
use quiz_anki::store::MemoryStore;
use quiz_anki::types::quiz::{QuizId, QuizRecord, UserId};
use quiz_anki::types::session::TokenKey;
use reqwest::Url;
use serde_json::{Value, json};
use warp::Filter;

fn key() -> TokenKey {
    TokenKey::new("RANDOM WORDS WINTER MACINTOSH PC").unwrap()
}

async fn start_quiz_server() -> SocketAddr {
    let store = MemoryStore::new();
    store
        .insert(QuizRecord {
            id: QuizId("q1".to_string()),
            user_id: UserId("u1".to_string()),
            questions: Some(json!([
                {
                    "question": "Which planet is known as the Red Planet?",
                    "type": "multiple_choice",
                    "options": ["Venus", "Mars", "Jupiter"],
                    "correctAnswer": "Mars"
                },
                {
                    "question": "What gas do plants absorb?",
                    "type": "short_answer",
                    "correctAnswer": "Carbon dioxide"
                }
            ])),
        })
        .await;

    let (addr, server) = warp::serve(server::routes(store, key(), Diagnostics::default()))
        .bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

fn start_fake_anki() -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let actions = Arc::new(Mutex::new(Vec::new()));
    let log = actions.clone();
    let route = warp::post()
        .and(warp::body::json())
        .map(move |req: Value| {
            let action = req["action"].as_str().unwrap_or_default().to_string();
            log.lock().unwrap().push(action.clone());
            let result = match action.as_str() {
                "version" => json!(6),
                "createDeck" => json!(1),
                "addNotes" => {
                    let count = req["params"]["notes"].as_array().map(|n| n.len()).unwrap_or(0);
                    Value::Array((0..count).map(|i| json!(1000 + i)).collect())
                }
                _ => Value::Null,
            };
            warp::reply::json(&json!({ "result": result, "error": null }))
        });
    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    (addr, actions)
}

fn api_client(addr: SocketAddr, user: &str) -> QuizApiClient {
    let token = issue_token(&UserId(user.to_string()), &key()).unwrap();
    QuizApiClient::new(Url::parse(&format!("http://{}/", addr)).unwrap(), token)
        .with_http_client(reqwest::Client::builder().no_proxy().build().unwrap())
}

#[tokio::test]
async fn exports_owned_quiz_to_deck() {
    let api_addr = start_quiz_server().await;
    let (anki_addr, actions) = start_fake_anki();

    let api = api_client(api_addr, "u1");
    let anki = AnkiClient::new(
        Url::parse(&format!("http://{}", anki_addr)).unwrap(),
        api.is_secure_context(),
    );

    let summary = export_quiz(&api, &anki, "q1", "Deck1").await.unwrap();

    assert!(summary.success);
    assert_eq!(summary.added_notes, 2);
    assert!(summary.message.contains("Deck1"));
    assert!(summary.message.contains('2'));
    assert_eq!(
        *actions.lock().unwrap(),
        vec!["version", "createDeck", "addNotes"]
    );
}

#[tokio::test]
async fn foreign_quiz_fails_before_touching_anki() {
    let api_addr = start_quiz_server().await;
    let (anki_addr, actions) = start_fake_anki();

    let api = api_client(api_addr, "u2");
    let anki = AnkiClient::new(Url::parse(&format!("http://{}", anki_addr)).unwrap(), false);

    match export_quiz(&api, &anki, "q1", "Deck1").await {
        Err(Error::Fetch { status, message }) => {
            assert_eq!(status, Some(404));
            assert_eq!(message, "Quiz not found");
        }
        other => panic!("expected fetch error, got {:?}", other),
    }
    assert!(actions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn anki_not_running_is_connectivity_error() {
    let api_addr = start_quiz_server().await;
    let closed = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let api = api_client(api_addr, "u1");
    let anki = AnkiClient::new(Url::parse(&format!("http://{}", closed)).unwrap(), false);

    match export_quiz(&api, &anki, "q1", "Deck1").await {
        Err(Error::Connectivity(message)) => assert!(message.contains("Anki must be running")),
        other => panic!("expected connectivity error, got {:?}", other),
    }
}
