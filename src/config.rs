use clap::{Parser, Subcommand};
use handle_errors::Error;
use reqwest::Url;
use serde::Deserialize;

use crate::anki::DEFAULT_ANKI_URL;
use crate::types::session::TokenKey;

/// Quiz → Anki 내보내기 서버와 클라이언트
#[derive(Parser, Debug)]
#[clap(author, version, about)]
pub struct Args {
    /// 설정 파일 경로. 파일이 없으면 기본값과 환경 변수만 사용한다.
    #[clap(long, default_value = "setup")]
    pub config: String,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 퀴즈 조회 엔드포인트를 띄운다.
    Serve,
    /// 퀴즈를 가져와 로컬 Anki로 보낸다.
    Export {
        #[clap(long)]
        quiz_id: String,
        #[clap(long)]
        deck: String,
        #[clap(long)]
        token: String,
    },
    /// 개발용 세션 토큰을 발급한다.
    Token {
        #[clap(long)]
        user_id: String,
    },
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub log_level: String,
    pub port: u16,
    pub database_url: String,
    pub paseto_key: Option<String>,
    pub api_url: String,
    pub anki_url: String,
    pub expose_error_details: bool,
}

impl Settings {
    /// .env를 읽은 뒤 설정 파일과 QUIZ_ANKI_* 환경 변수를 합친다.
    pub fn load(path: &str) -> Result<Settings, Error> {
        dotenv::dotenv().ok();
        Settings::from_sources(path)
    }

    pub fn from_sources(path: &str) -> Result<Settings, Error> {
        let settings = config::Config::builder()
            .set_default("log_level", "warn")
            .and_then(|b| b.set_default("port", 3030_i64))
            .and_then(|b| b.set_default("database_url", "postgres://localhost:5432/quiz_anki"))
            .and_then(|b| b.set_default("api_url", "http://127.0.0.1:3030/"))
            .and_then(|b| b.set_default("anki_url", DEFAULT_ANKI_URL))
            .and_then(|b| b.set_default("expose_error_details", false))
            .map_err(|e| Error::ConfigError(e.to_string()))?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("QUIZ_ANKI"))
            .build()
            .and_then(|c| c.try_deserialize::<Settings>())
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        settings.api_url()?;
        settings.anki_url()?;
        Ok(settings)
    }

    pub fn token_key(&self) -> Result<TokenKey, Error> {
        match &self.paseto_key {
            Some(key) => TokenKey::new(key),
            None => Err(Error::ConfigError("paseto_key is not set".to_string())),
        }
    }

    pub fn api_url(&self) -> Result<Url, Error> {
        Url::parse(&self.api_url).map_err(|e| Error::ConfigError(format!("api_url: {}", e)))
    }

    pub fn anki_url(&self) -> Result<Url, Error> {
        Url::parse(&self.anki_url).map_err(|e| Error::ConfigError(format!("anki_url: {}", e)))
    }
}
