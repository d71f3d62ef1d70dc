use handle_errors::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::note::{Note, option_label};

#[derive(Serialize, Debug, Clone, Eq, Hash, Deserialize, PartialEq)]
pub struct QuizId(pub String);

#[derive(Serialize, Debug, Clone, Eq, Hash, Deserialize, PartialEq)]
pub struct UserId(pub String);

impl std::fmt::Display for QuizId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 저장소에서 읽어온 그대로의 퀴즈 행.
/// questions 열은 아직 검증되지 않은 JSON이다.
#[derive(Debug, Clone)]
pub struct QuizRecord {
    pub id: QuizId,
    pub user_id: UserId,
    pub questions: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: QuizId,
    pub user_id: UserId,
    pub questions: Vec<Question>,
}

/// 질문 유형 문자열과 알 수 없는 필드는 읽은 그대로 보관했다가 다시 내보낸다.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(from = "RawQuestion", into = "RawQuestion")]
pub enum Question {
    MultipleChoice {
        prompt: String,
        options: Vec<String>,
        correct_answer: String,
        extra: Map<String, Value>,
    },
    /// multiple_choice가 아닌 모든 유형. kind에 원래 유형 이름이 남는다.
    ShortAnswer {
        prompt: String,
        kind: String,
        correct_answer: String,
        extra: Map<String, Value>,
    },
}

// JSON으로 주고받는 모양: { question, type, options?, correctAnswer, ... }
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    question: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options: Option<Vec<String>>,
    correct_answer: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

const MULTIPLE_CHOICE: &str = "multiple_choice";

impl From<RawQuestion> for Question {
    fn from(raw: RawQuestion) -> Self {
        if raw.kind == MULTIPLE_CHOICE {
            Question::MultipleChoice {
                prompt: raw.question,
                options: raw.options.unwrap_or_default(),
                correct_answer: raw.correct_answer,
                extra: raw.extra,
            }
        } else {
            let mut extra = raw.extra;
            // 객관식이 아닌데 보기가 붙어 있으면 버리지 않고 그대로 돌려준다.
            if let Some(options) = raw.options {
                extra.insert("options".to_string(), Value::from(options));
            }
            Question::ShortAnswer {
                prompt: raw.question,
                kind: raw.kind,
                correct_answer: raw.correct_answer,
                extra,
            }
        }
    }
}

impl From<Question> for RawQuestion {
    fn from(question: Question) -> Self {
        match question {
            Question::MultipleChoice {
                prompt,
                options,
                correct_answer,
                extra,
            } => RawQuestion {
                question: prompt,
                kind: MULTIPLE_CHOICE.to_string(),
                options: Some(options),
                correct_answer,
                extra,
            },
            Question::ShortAnswer {
                prompt,
                kind,
                correct_answer,
                extra,
            } => RawQuestion {
                question: prompt,
                kind,
                options: None,
                correct_answer,
                extra,
            },
        }
    }
}

impl Question {
    pub fn prompt(&self) -> &str {
        match self {
            Question::MultipleChoice { prompt, .. } | Question::ShortAnswer { prompt, .. } => {
                prompt
            }
        }
    }

    pub fn correct_answer(&self) -> &str {
        match self {
            Question::MultipleChoice { correct_answer, .. }
            | Question::ShortAnswer { correct_answer, .. } => correct_answer,
        }
    }

    /// Anki 카드 앞면에 들어갈 HTML.
    /// 객관식이면 보기를 a), b), ... 순서로 <br> 줄바꿈과 함께 덧붙인다.
    pub fn front(&self) -> String {
        match self {
            Question::MultipleChoice {
                prompt, options, ..
            } if !options.is_empty() => {
                let lines = options
                    .iter()
                    .enumerate()
                    .map(|(i, option)| format!("{}) {}", option_label(i), option))
                    .collect::<Vec<_>>()
                    .join("<br>");
                format!("{}<br><br>{}", prompt, lines)
            }
            _ => self.prompt().to_string(),
        }
    }
}

impl Quiz {
    /// 저장소 행을 검증해서 Quiz로 바꾼다.
    /// questions가 없거나, 배열이 아니거나, 비어 있으면 구조 에러다.
    pub fn from_record(record: QuizRecord) -> Result<Quiz, Error> {
        let questions = match record.questions {
            Some(Value::Array(items)) if !items.is_empty() => items,
            Some(Value::Array(_)) => {
                return Err(Error::InvalidQuizStructure(
                    "quiz has no questions".to_string(),
                ));
            }
            Some(_) => {
                return Err(Error::InvalidQuizStructure(
                    "questions is not a list".to_string(),
                ));
            }
            None => {
                return Err(Error::InvalidQuizStructure(
                    "questions are missing".to_string(),
                ));
            }
        };

        let questions = questions
            .into_iter()
            .map(serde_json::from_value::<Question>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidQuizStructure(e.to_string()))?;

        Ok(Quiz {
            id: record.id,
            user_id: record.user_id,
            questions,
        })
    }

    /// 퀴즈의 모든 질문을 지정한 덱의 Anki 노트로 바꾼다.
    pub fn to_notes(&self, deck_name: &str) -> Result<Vec<Note>, Error> {
        if self.questions.is_empty() {
            return Err(Error::InvalidQuizStructure(
                "quiz has no questions".to_string(),
            ));
        }

        Ok(self
            .questions
            .iter()
            .map(|question| Note::from_question(question, deck_name, &self.id))
            .collect())
    }
}
