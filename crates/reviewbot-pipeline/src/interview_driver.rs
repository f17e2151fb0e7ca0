use reviewbot_core::{InterviewQuestion, InterviewStep, JobError, JobResult};
use reviewbot_sandbox::with_sandbox;

use crate::runtime::Services;

const INTERVIEW_SYSTEM_PROMPT: &str = "\
You are conducting a structured interview with a repository maintainer to \
build a code-review persona document. Ask one question at a time, drawing \
on the codebase analysis provided and the answers given so far. Cover \
architecture, layers, API conventions, testing, error handling, review \
philosophy, and what to ignore. Ask at least 7 and at most 15 questions \
total, aiming for around 12. When you have enough to write a persona, stop \
asking and emit the final persona document instead.

Respond with exactly one JSON object, one of:
{\"status\": \"question\", \"question\": <InterviewQuestion>, \"question_number\": n, \"estimated_total\": n}
{\"status\": \"complete\", \"persona\": \"...\"}
{\"status\": \"error\", \"message\": \"...\"}

An InterviewQuestion is one of:
{\"type\": \"single_select\", \"prompt\": \"...\", \"options\": [...]}
{\"type\": \"multi_select\", \"prompt\": \"...\", \"options\": [...]}
{\"type\": \"code_opinion\", \"prompt\": \"...\", \"options\": [...], \"code_snippet\": \"...\", \"code_file\": \"...\"}
{\"type\": \"confirm_correct\", \"prompt\": \"...\", \"detections\": [...]}
{\"type\": \"short_text\", \"prompt\": \"...\", \"placeholder\": \"...\" | null}

Respond with the JSON object and nothing else.";

/// One answered question in the transcript so far.
#[derive(Debug, Clone)]
pub struct AnsweredQuestion {
    pub question: InterviewQuestion,
    pub answer: String,
}

/// Run one interview step: a single LLM call over the analysis profile and
/// the prior Q/A transcript, routed through the same sandbox mechanism as
/// Analyzer and Reviewer. Stateless — the caller persists whatever the
/// returned `InterviewStep` implies (append to the transcript, write the
/// persona, transition status).
pub async fn run(
    services: &Services,
    api_key: &str,
    model: &str,
    analysis_profile: Option<&str>,
    answers: &[AnsweredQuestion],
) -> JobResult<InterviewStep> {
    let user_message = build_transcript(analysis_profile, answers);

    let image = services.config.sandbox_image.clone();
    let docker_bin = services.config.docker_bin.clone();
    let agent_bin = services.config.agent_bin.clone();
    let timeout = services.config.analyze_timeout;
    let model_for_agent = model.to_string();
    let api_key = api_key.to_string();

    let outcome = with_sandbox(&image, &docker_bin, move |sandbox| {
        let model = model_for_agent;
        Box::pin(async move {
            sandbox.write_file("/tmp/system-prompt.md", INTERVIEW_SYSTEM_PROMPT).await?;
            sandbox.write_file("/tmp/user-message.md", &user_message).await?;

            let mut keys = std::collections::BTreeMap::new();
            keys.insert(settings_provider_key(&model), api_key);
            reviewbot_agent::write_auth_json(&keys)
                .await
                .map_err(|e| reviewbot_sandbox::SandboxError::WriteFile {
                    path: "auth.json".into(),
                    source: std::io::Error::other(e.to_string()),
                })?;

            let command = format!(
                "cat /tmp/user-message.md | {agent_bin} run --model {model} --format json \
                 --file /tmp/system-prompt.md > /tmp/result.txt"
            );
            sandbox
                .exec_with_timeout(&["sh", "-c", &command], timeout)
                .await?;

            let read = sandbox.exec(&["cat", "/tmp/result.txt"]).await?;
            Ok(read.stdout)
        })
    })
    .await
    .map_err(JobError::from)?;

    let parsed = reviewbot_agent::parse_agent_response(&outcome).map_err(JobError::from)?;
    let step: InterviewStep = serde_json::from_value(parsed)
        .map_err(|e| JobError::AgentResponseInvalidShape(e.to_string()))?;

    if let InterviewStep::Question { ref question, .. } = step {
        question
            .validate()
            .map_err(|e| JobError::AgentResponseInvalidShape(e.to_string()))?;
    }

    Ok(step)
}

fn build_transcript(analysis_profile: Option<&str>, answers: &[AnsweredQuestion]) -> String {
    let mut out = String::new();
    out.push_str("## Codebase analysis\n\n");
    out.push_str(analysis_profile.filter(|p| !p.trim().is_empty()).unwrap_or("(none)"));
    out.push_str("\n\n## Prior questions and answers\n\n");

    if answers.is_empty() {
        out.push_str("(none yet — this is the first question)\n");
    } else {
        for (i, a) in answers.iter().enumerate() {
            out.push_str(&format!(
                "{}. {}\n   Answer: {}\n",
                i + 1,
                question_prompt(&a.question),
                a.answer
            ));
        }
    }

    out
}

fn question_prompt(question: &InterviewQuestion) -> &str {
    match question {
        InterviewQuestion::SingleSelect { prompt, .. }
        | InterviewQuestion::MultiSelect { prompt, .. }
        | InterviewQuestion::CodeOpinion { prompt, .. }
        | InterviewQuestion::ConfirmCorrect { prompt, .. }
        | InterviewQuestion::ShortText { prompt, .. } => prompt,
    }
}

fn settings_provider_key(model: &str) -> String {
    model.split_once('/').map(|(p, _)| p).unwrap_or(model).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_marks_first_question_when_no_answers() {
        let out = build_transcript(Some("a monorepo"), &[]);
        assert!(out.contains("a monorepo"));
        assert!(out.contains("first question"));
    }

    #[test]
    fn transcript_lists_prior_answers_in_order() {
        let answers = vec![
            AnsweredQuestion {
                question: InterviewQuestion::ShortText { prompt: "Test framework?".into(), placeholder: None },
                answer: "jest".into(),
            },
            AnsweredQuestion {
                question: InterviewQuestion::SingleSelect {
                    prompt: "Preferred error style?".into(),
                    options: vec!["Result".into(), "exceptions".into()],
                },
                answer: "Result".into(),
            },
        ];
        let out = build_transcript(None, &answers);
        assert!(out.contains("1. Test framework?\n   Answer: jest"));
        assert!(out.contains("2. Preferred error style?\n   Answer: Result"));
        assert!(out.contains("(none)"));
    }
}
