use reviewbot_core::ReviewComment;

use crate::types::{FileChange, FileStatus};

const PER_FILE_CHAR_CAP: usize = 15_000;
const PER_FILE_LINE_CAP: usize = 500;
const TOTAL_CHAR_CAP: usize = 100_000;

/// Render a unified patch's hunks with the prefix convention §8 tests
/// against: `N:+` for an added line (new-file line number), `   -` for a
/// removed line (three-space pad, no line number since it has none in the
/// new file), `N: ` for context.
fn annotate_patch(patch: &str) -> String {
    let mut out = String::new();
    let mut new_line = 0u32;
    let mut lines_emitted = 0usize;

    for line in patch.lines() {
        if lines_emitted >= PER_FILE_LINE_CAP {
            out.push_str("... (truncated)\n");
            break;
        }
        if let Some(rest) = line.strip_prefix("@@") {
            out.push_str(line);
            out.push('\n');
            new_line = parse_hunk_new_start(rest).unwrap_or(new_line);
            lines_emitted += 1;
            continue;
        }
        if let Some(added) = line.strip_prefix('+') {
            out.push_str(&format!("{new_line}:+{added}\n"));
            new_line += 1;
        } else if let Some(removed) = line.strip_prefix('-') {
            out.push_str(&format!("   -{removed}\n"));
        } else {
            let context = line.strip_prefix(' ').unwrap_or(line);
            out.push_str(&format!("{new_line}: {context}\n"));
            new_line += 1;
        }
        lines_emitted += 1;

        if out.len() > PER_FILE_CHAR_CAP {
            out.truncate(PER_FILE_CHAR_CAP);
            out.push_str("\n... (truncated)\n");
            break;
        }
    }

    out
}

/// Parse the new-file start line out of a `@@ -a,b +c,d @@` hunk header.
fn parse_hunk_new_start(hunk_rest: &str) -> Option<u32> {
    let plus_idx = hunk_rest.find('+')?;
    let after_plus = &hunk_rest[plus_idx + 1..];
    let end = after_plus.find(|c: char| !c.is_ascii_digit())?;
    after_plus[..end].parse().ok()
}

fn status_label(status: FileStatus) -> &'static str {
    match status {
        FileStatus::Added => "added",
        FileStatus::Modified => "modified",
        FileStatus::Removed => "removed",
        FileStatus::Renamed => "renamed",
    }
}

/// Emit `### path (status, +adds -dels)` headers followed by fenced,
/// line-annotated diff blocks, truncating per-file and in total per §4.C.
pub fn format_diff(files: &[FileChange]) -> String {
    let mut out = String::new();
    let mut truncated_files = 0usize;

    for file in files {
        let Some(patch) = file.patch.as_deref() else {
            continue;
        };

        let mut section = format!(
            "### {} ({}, +{} -{})\n```diff\n",
            file.path,
            status_label(file.status),
            file.additions,
            file.deletions
        );
        section.push_str(&annotate_patch(patch));
        section.push_str("```\n\n");

        if out.len() + section.len() > TOTAL_CHAR_CAP {
            truncated_files += 1;
            continue;
        }
        out.push_str(&section);
    }

    if truncated_files > 0 {
        out.push_str(&format!("... ({truncated_files} more files truncated)\n"));
    }

    out
}

/// The message, followed by a fenced `suggestion` block iff non-empty.
pub fn format_comment(comment: &ReviewComment) -> String {
    match &comment.suggestion {
        Some(suggestion) if !suggestion.is_empty() => {
            format!("{}\n\n```suggestion\n{}\n```", comment.message, suggestion)
        }
        _ => comment.message.clone(),
    }
}
