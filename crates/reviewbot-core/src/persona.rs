const NONE_SENTINEL: &str = "(none)";

/// Substitute the four named placeholders into a review system-prompt template:
/// `{{persona}}`, `{{analysis}}`, `{{predefined_skills}}`, `{{custom_skills}}`.
/// A missing persona or analysis profile is replaced with a stable `(none)`
/// sentinel rather than an empty string, so the rendered prompt never reads
/// as truncated.
pub fn render_system_prompt(
    template: &str,
    persona: Option<&str>,
    analysis: Option<&str>,
    predefined_skills: &str,
    custom_skills: &str,
) -> String {
    template
        .replace("{{persona}}", non_empty_or_sentinel(persona))
        .replace("{{analysis}}", non_empty_or_sentinel(analysis))
        .replace("{{predefined_skills}}", predefined_skills)
        .replace("{{custom_skills}}", custom_skills)
}

fn non_empty_or_sentinel(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => NONE_SENTINEL,
    }
}

/// Default review system-prompt template used when the server config doesn't
/// override it. Mirrors the four-placeholder contract described in §4.I.
pub const DEFAULT_REVIEW_PROMPT_TEMPLATE: &str = "\
You are reviewing a pull request for a team with the following review persona:

{{persona}}

Codebase analysis:

{{analysis}}

Predefined skills to apply:

{{predefined_skills}}

Team-specific custom skills:

{{custom_skills}}

Respond with a JSON object of the shape {\"comments\": [...]} and nothing else.";
