use serde::{Deserialize, Serialize};

use crate::types::quiz::{Question, QuizId};

pub const NOTE_MODEL: &str = "Basic";
pub const PRODUCT_TAG: &str = "quiz-anki";

/// AnkiConnect addNotes가 받는 노트 하나.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub deck_name: String,
    pub model_name: String,
    pub fields: NoteFields,
    pub options: NoteOptions,
    pub tags: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NoteFields {
    #[serde(rename = "Front")]
    pub front: String,
    #[serde(rename = "Back")]
    pub back: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NoteOptions {
    pub allow_duplicate: bool,
    pub duplicate_scope: String,
}

impl Default for NoteOptions {
    fn default() -> Self {
        NoteOptions {
            allow_duplicate: false,
            duplicate_scope: "deck".to_string(),
        }
    }
}

impl Note {
    pub fn from_question(question: &Question, deck_name: &str, quiz_id: &QuizId) -> Self {
        Note {
            deck_name: deck_name.to_string(),
            model_name: NOTE_MODEL.to_string(),
            fields: NoteFields {
                front: question.front(),
                back: question.correct_answer().to_string(),
            },
            options: NoteOptions::default(),
            tags: vec![format!("quiz-{}", quiz_id), PRODUCT_TAG.to_string()],
        }
    }
}

/// 보기 번호를 a, b, ..., z, aa, ab, ... 순서로 만든다.
pub fn option_label(index: usize) -> String {
    let mut label = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        n -= 1;
        label.push(b'a' + (n % 26) as u8);
        n /= 26;
    }
    label.reverse();
    String::from_utf8(label).unwrap_or_default()
}
