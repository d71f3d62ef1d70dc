use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use tokio::sync::RwLock;

use handle_errors::Error;

use crate::types::quiz::{QuizId, QuizRecord, UserId};

/// 퀴즈 저장소. 조회는 항상 퀴즈 id와 소유자 id를 함께 사용한다.
pub trait QuizStore: Clone + Send + Sync + 'static {
    /// 소유자가 일치하는 퀴즈가 없으면 `Ok(None)`을 돌려준다.
    fn get_quiz(
        &self,
        quiz_id: &QuizId,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Option<QuizRecord>, Error>> + Send;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pub connection: PgPool,
}

impl PgStore {
    pub async fn new(db_url: &str) -> Result<Self, Error> {
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .map_err(Error::DatabaseQueryError)?;

        Ok(PgStore {
            connection: db_pool,
        })
    }
}

impl QuizStore for PgStore {
    async fn get_quiz(
        &self,
        quiz_id: &QuizId,
        user_id: &UserId,
    ) -> Result<Option<QuizRecord>, Error> {
        match sqlx::query("SELECT id, user_id, questions FROM quizzes WHERE id = $1 AND user_id = $2")
            .bind(quiz_id.0.clone())
            .bind(user_id.0.clone())
            .map(|row: PgRow| QuizRecord {
                id: QuizId(row.get("id")),
                user_id: UserId(row.get("user_id")),
                questions: row.get("questions"),
            })
            .fetch_optional(&self.connection) // 행이 없으면 None
            .await
        {
            Ok(quiz) => Ok(quiz),
            Err(error) => {
                tracing::event!(tracing::Level::ERROR, "{:?}", error);
                Err(Error::DatabaseQueryError(error))
            }
        }
    }
}

/// 프로세스 메모리에 퀴즈를 보관하는 저장소.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    quizzes: Arc<RwLock<HashMap<QuizId, QuizRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub async fn insert(&self, record: QuizRecord) {
        self.quizzes.write().await.insert(record.id.clone(), record);
    }
}

impl QuizStore for MemoryStore {
    async fn get_quiz(
        &self,
        quiz_id: &QuizId,
        user_id: &UserId,
    ) -> Result<Option<QuizRecord>, Error> {
        Ok(self
            .quizzes
            .read()
            .await
            .get(quiz_id)
            .filter(|record| &record.user_id == user_id)
            .cloned())
    }
}
