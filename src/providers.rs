use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::models::{Answer, FileUpload, Question, QuestionType};

/// Turns an uploaded document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, file: &FileUpload) -> Result<String>;
}

/// Produces quiz questions from extracted document text.
#[async_trait]
pub trait QuizGenerator: Send + Sync {
    async fn generate_questions(&self, source_text: &str, question_count: usize) -> Result<Vec<Question>>;
}

/// Extractor that returns canned text after a fixed delay.
#[derive(Debug, Clone, Default)]
pub struct MockTextExtractor {
    delay: Duration,
}

impl MockTextExtractor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl TextExtractor for MockTextExtractor {
    async fn extract_text(&self, file: &FileUpload) -> Result<String> {
        debug!(file_name = %file.name, delay_ms = self.delay.as_millis() as u64, "Simulating text extraction");
        tokio::time::sleep(self.delay).await;
        Ok(format!(
            "This is mock extracted text from {}. In a real implementation, this would contain the actual text extracted from the PDF.",
            file.name
        ))
    }
}

/// Generator that serves the first `question_count` questions of a fixed
/// bank. Requests larger than the bank get the whole bank.
#[derive(Debug, Clone)]
pub struct MockQuizGenerator {
    delay: Duration,
    bank: Vec<Question>,
}

impl MockQuizGenerator {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            bank: question_bank(),
        }
    }

    pub fn with_bank(delay: Duration, bank: Vec<Question>) -> Self {
        Self { delay, bank }
    }
}

#[async_trait]
impl QuizGenerator for MockQuizGenerator {
    async fn generate_questions(&self, _source_text: &str, question_count: usize) -> Result<Vec<Question>> {
        tokio::time::sleep(self.delay).await;
        Ok(self.bank.iter().take(question_count).cloned().collect())
    }
}

pub fn question_bank() -> Vec<Question> {
    vec![
        Question {
            id: "1".to_string(),
            question_type: QuestionType::MultipleChoice,
            question: "What is the primary function of mitochondria in cells?".to_string(),
            options: Some(vec![
                "Protein synthesis".to_string(),
                "Energy production".to_string(),
                "DNA storage".to_string(),
                "Waste removal".to_string(),
            ]),
            correct_answer: Answer::Index(1),
            explanation: Some(
                "Mitochondria are known as the powerhouse of the cell, responsible for producing ATP through cellular respiration."
                    .to_string(),
            ),
        },
        Question {
            id: "2".to_string(),
            question_type: QuestionType::TrueFalse,
            question: "Photosynthesis occurs only in the leaves of plants.".to_string(),
            options: None,
            correct_answer: Answer::Index(0),
            explanation: Some(
                "Photosynthesis can occur in any green part of the plant that contains chlorophyll, including stems and green fruits."
                    .to_string(),
            ),
        },
        Question {
            id: "3".to_string(),
            question_type: QuestionType::MultipleChoice,
            question: "Which of the following is NOT a renewable energy source?".to_string(),
            options: Some(vec![
                "Solar power".to_string(),
                "Wind power".to_string(),
                "Coal".to_string(),
                "Hydroelectric power".to_string(),
            ]),
            correct_answer: Answer::Index(2),
            explanation: Some(
                "Coal is a fossil fuel and is considered non-renewable because it takes millions of years to form."
                    .to_string(),
            ),
        },
    ]
}
