//! Agent prompts

/// Prompt for the first attempt at a vulnerability
pub fn first_attempt_prompt(project: &str, crash_type: &str) -> String {
    format!(
        "Find and fix the bug in {} to remove the {} shown in the crash.log file. \
         Provide the lines of code and file locations changed in this task.",
        project, crash_type
    )
}

/// Prompt for a retry after the first patch failed
///
/// Embeds the crash log of the failed patch when one is available.
pub fn retry_prompt(crash_log: Option<&str>, additional_context: &str) -> String {
    let mut parts = vec![match crash_log {
        Some(log) => format!(
            "Your previous fixes did not remove the crash as indicated by this new crash log: <crash_log>{}</crash_log>",
            log
        ),
        None => "Your previous fixes did not remove the crash.".to_string(),
    }];

    parts.push("The workspace has been reset with the original files.".to_string());
    let context = additional_context.trim();
    if !context.is_empty() {
        parts.push(context.to_string());
    }
    parts.push("Use this information to reattempt the fix.".to_string());

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_prompt() {
        assert_eq!(
            first_attempt_prompt("wolfssl", "Heap-buffer-overflow"),
            "Find and fix the bug in wolfssl to remove the Heap-buffer-overflow shown in the crash.log file. \
             Provide the lines of code and file locations changed in this task."
        );
    }

    #[test]
    fn test_retry_prompt_without_crash_log() {
        assert_eq!(
            retry_prompt(None, "  "),
            "Your previous fixes did not remove the crash. \
             The workspace has been reset with the original files. \
             Use this information to reattempt the fix."
        );
    }

    #[test]
    fn test_retry_prompt_with_crash_log_and_context() {
        let prompt = retry_prompt(
            Some("READ of size 4"),
            "A known correct fix changed wolfcrypt/src/dh.c near line 1212.",
        );

        assert!(prompt.starts_with(
            "Your previous fixes did not remove the crash as indicated by this new crash log: \
             <crash_log>READ of size 4</crash_log> The workspace"
        ));
        assert!(prompt.contains("dh.c near line 1212. Use this information"));
    }
}
