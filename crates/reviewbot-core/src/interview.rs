use serde::{Deserialize, Serialize};

/// One step of the persona interview. The agent emits exactly one of these per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InterviewStep {
    Question {
        question: InterviewQuestion,
        question_number: u32,
        estimated_total: u32,
    },
    Complete {
        persona: String,
    },
    Error {
        message: String,
    },
}

/// The five question shapes the interview can ask. `type` selects the variant;
/// each carries the fields required to render and validate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterviewQuestion {
    SingleSelect { prompt: String, options: Vec<String> },
    MultiSelect { prompt: String, options: Vec<String> },
    CodeOpinion {
        prompt: String,
        options: Vec<String>,
        code_snippet: String,
        code_file: String,
    },
    ConfirmCorrect { prompt: String, detections: Vec<String> },
    ShortText {
        prompt: String,
        #[serde(default)]
        placeholder: Option<String>,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InterviewValidationError {
    #[error("{0} requires a non-empty options list")]
    EmptyOptions(&'static str),
    #[error("code_opinion requires both codeSnippet and codeFile")]
    MissingCodeContext,
    #[error("confirm_correct requires a non-empty detections list")]
    EmptyDetections,
}

impl InterviewQuestion {
    /// Reject shapes missing their required per-type fields, per §4.J.
    pub fn validate(&self) -> Result<(), InterviewValidationError> {
        match self {
            InterviewQuestion::SingleSelect { options, .. } if options.is_empty() => {
                Err(InterviewValidationError::EmptyOptions("single_select"))
            }
            InterviewQuestion::MultiSelect { options, .. } if options.is_empty() => {
                Err(InterviewValidationError::EmptyOptions("multi_select"))
            }
            InterviewQuestion::CodeOpinion {
                options,
                code_snippet,
                code_file,
                ..
            } => {
                if options.is_empty() {
                    Err(InterviewValidationError::EmptyOptions("code_opinion"))
                } else if code_snippet.is_empty() || code_file.is_empty() {
                    Err(InterviewValidationError::MissingCodeContext)
                } else {
                    Ok(())
                }
            }
            InterviewQuestion::ConfirmCorrect { detections, .. } if detections.is_empty() => {
                Err(InterviewValidationError::EmptyDetections)
            }
            _ => Ok(()),
        }
    }
}

/// Interview categories that the prompt-level budget policy (§4.J) must cover
/// across a full interview. Not enforced in code; tracked for documentation
/// and for any future coverage audit over a transcript.
pub const INTERVIEW_CATEGORIES: &[&str] = &[
    "architecture",
    "layers",
    "api",
    "testing",
    "errors",
    "review_philosophy",
    "ignore",
];

pub const MIN_QUESTIONS: u32 = 7;
pub const SOFT_TARGET_QUESTIONS: u32 = 12;
pub const MAX_QUESTIONS: u32 = 15;
