//! Trivia pack schema. Loading packs from a repository is an external
//! concern; this module only defines the question shape the game consumes
//! and a structural validation pass over a loaded question list.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Mcq,
    Boolean,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Choice {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub choice_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub prompt: String,
    pub choices: Vec<Choice>,
    pub answer: Answer,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PackIssue {
    #[error("question {0}: prompt is empty")]
    EmptyPrompt(String),
    #[error("question {0}: fewer than 2 choices")]
    TooFewChoices(String),
    #[error("question {0}: boolean questions need exactly 2 choices")]
    BooleanArity(String),
    #[error("question {0}: answer references unknown choice {1}")]
    UnknownAnswerChoice(String, String),
    #[error("question {0}: duplicate choice id {1}")]
    DuplicateChoiceId(String, String),
    #[error("duplicate question id {0}")]
    DuplicateQuestionId(String),
}

/// Structural validation over a loaded question list. Returns every issue
/// found instead of stopping at the first one.
pub fn validate_questions(questions: &[Question]) -> Vec<PackIssue> {
    let mut issues = Vec::new();
    let mut seen_question_ids = std::collections::HashSet::new();

    for question in questions {
        if !seen_question_ids.insert(question.id.as_str()) {
            issues.push(PackIssue::DuplicateQuestionId(question.id.clone()));
        }
        if question.prompt.trim().is_empty() {
            issues.push(PackIssue::EmptyPrompt(question.id.clone()));
        }
        if question.choices.len() < 2 {
            issues.push(PackIssue::TooFewChoices(question.id.clone()));
        }
        if question.kind == QuestionType::Boolean && question.choices.len() != 2 {
            issues.push(PackIssue::BooleanArity(question.id.clone()));
        }

        let mut seen_choice_ids = std::collections::HashSet::new();
        for choice in &question.choices {
            if !seen_choice_ids.insert(choice.id.as_str()) {
                issues.push(PackIssue::DuplicateChoiceId(
                    question.id.clone(),
                    choice.id.clone(),
                ));
            }
        }
        if !seen_choice_ids.contains(question.answer.choice_id.as_str()) {
            issues.push(PackIssue::UnknownAnswerChoice(
                question.id.clone(),
                question.answer.choice_id.clone(),
            ));
        }
    }

    issues
}
