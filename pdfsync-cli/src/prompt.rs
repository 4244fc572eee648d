//! Terminal prompts: batch confirmation and conflict decisions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_sync::{ConflictChoice, ConflictDescriptor, ConflictResolver};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tracing::warn;

use crate::cli::ConflictPolicy;

/// Line-oriented questions on stderr, answers from stdin
pub struct Prompt {
    input: Mutex<BufReader<Stdin>>,
}

impl Prompt {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }

    /// Ask and read one trimmed, lowercased answer; `None` on end of input
    pub async fn ask(&self, question: &str) -> std::io::Result<Option<String>> {
        eprint!("{} ", question);
        std::io::stderr().flush()?;

        let mut line = String::new();
        let read = self.input.lock().await.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_lowercase()))
    }

    pub async fn confirm(&self, question: &str) -> std::io::Result<bool> {
        let answer = self.ask(&format!("{} [y/N]", question)).await?;
        Ok(matches!(answer.as_deref(), Some("y") | Some("yes")))
    }
}

fn timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// Parse a conflict answer: `e`xternal, `i`nternal or `s`kip
pub fn parse_choice(answer: &str) -> Option<ConflictChoice> {
    match answer {
        "e" | "external" => Some(ConflictChoice::UseExternal),
        "i" | "internal" => Some(ConflictChoice::UseInternal),
        "s" | "skip" | "" => Some(ConflictChoice::Skip),
        _ => None,
    }
}

/// Settles conflicts from the command-line policy, asking when it says so
pub struct CliResolver<'a> {
    policy: ConflictPolicy,
    prompt: &'a Prompt,
}

impl<'a> CliResolver<'a> {
    pub fn new(policy: ConflictPolicy, prompt: &'a Prompt) -> Self {
        Self { policy, prompt }
    }
}

#[async_trait]
impl ConflictResolver for CliResolver<'_> {
    async fn resolve(&self, conflict: &ConflictDescriptor) -> ConflictChoice {
        match self.policy {
            ConflictPolicy::External => return ConflictChoice::UseExternal,
            ConflictPolicy::Internal => return ConflictChoice::UseInternal,
            ConflictPolicy::Skip => return ConflictChoice::Skip,
            ConflictPolicy::Ask => {}
        }

        eprintln!(
            "\n{} changed on both sides since {}\n  library:  {} ({})\n  external: {} ({})",
            conflict.filename,
            timestamp(conflict.last_synced),
            conflict.internal_path.display(),
            timestamp(conflict.internal_modified),
            conflict.external_path.display(),
            timestamp(conflict.external_modified),
        );

        loop {
            match self
                .prompt
                .ask("Keep [e]xternal, [i]nternal or [s]kip?")
                .await
            {
                Ok(Some(answer)) => match parse_choice(&answer) {
                    Some(choice) => return choice,
                    None => eprintln!("Please answer e, i or s."),
                },
                Ok(None) => return ConflictChoice::Skip,
                Err(e) => {
                    warn!(error = %e, "Failed to read conflict answer");
                    return ConflictChoice::Skip;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("e"), Some(ConflictChoice::UseExternal));
        assert_eq!(parse_choice("internal"), Some(ConflictChoice::UseInternal));
        assert_eq!(parse_choice(""), Some(ConflictChoice::Skip));
        assert_eq!(parse_choice("maybe"), None);
    }

    #[test]
    fn test_timestamp_formatting() {
        assert_eq!(timestamp(0), "1970-01-01 00:00:00");
    }

    #[tokio::test]
    async fn test_fixed_policy_does_not_prompt() {
        let prompt = Prompt::new();
        let resolver = CliResolver::new(ConflictPolicy::Internal, &prompt);
        let conflict = ConflictDescriptor {
            key: "K1".into(),
            filename: "a.pdf".to_string(),
            internal_path: "/library/a.pdf".into(),
            external_path: "/tablet/a.pdf".into(),
            internal_modified: 3,
            external_modified: 2,
            last_synced: 1,
        };

        assert_eq!(resolver.resolve(&conflict).await, ConflictChoice::UseInternal);
    }
}
