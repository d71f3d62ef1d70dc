#![warn(clippy::all)]

use clap::Parser;
use tracing_subscriber::fmt::format::FmtSpan;

use quiz_anki::anki::AnkiClient;
use quiz_anki::config::{Args, Command, Settings};
use quiz_anki::export::{QuizApiClient, export_quiz};
use quiz_anki::routes::authentication::issue_token;
use quiz_anki::routes::quiz::Diagnostics;
use quiz_anki::server;
use quiz_anki::store::PgStore;
use quiz_anki::types::quiz::UserId;

#[tokio::main]
async fn main() -> Result<(), handle_errors::Error> {
    let args = Args::parse();
    let settings = Settings::load(&args.config)?;

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        format!(
            "quiz_anki={},handle_errors={},warp=error",
            settings.log_level, settings.log_level
        )
    });

    tracing_subscriber::fmt()
        // 위에 만든 필터로 어떤 추적을 기록할지 결정한다.
        .with_env_filter(log_filter)
        // 각 범위가 닫힐 때 이벤트를 기록한다.
        .with_span_events(FmtSpan::CLOSE)
        .init();

    match args.command {
        Command::Serve => {
            let key = settings.token_key()?;
            let store = PgStore::new(&settings.database_url).await?;

            sqlx::migrate!()
                .run(&store.connection)
                .await
                .map_err(|e| handle_errors::Error::ConfigError(format!("Cannot run migration: {}", e)))?;

            let diagnostics = Diagnostics {
                expose_details: settings.expose_error_details,
            };
            server::serve(store, key, diagnostics, settings.port).await;
        }
        Command::Export {
            quiz_id,
            deck,
            token,
        } => {
            let api = QuizApiClient::new(settings.api_url()?, token);
            // Anki 클라이언트는 Anki가 실행되는 데스크톱에서만 만든다.
            let anki = AnkiClient::new(settings.anki_url()?, api.is_secure_context());

            let summary = export_quiz(&api, &anki, &quiz_id, &deck).await?;
            println!("{}", summary.message);
        }
        Command::Token { user_id } => {
            let token = issue_token(&UserId(user_id), &settings.token_key()?)?;
            println!("{}", token);
        }
    }

    Ok(())
}
