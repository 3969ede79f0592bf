//! Pipeline parsing and validation
//!
//! Commands are opaque token streams. This module splits a command on
//! unquoted `|`, rejects shell metacharacters, tokenizes each stage
//! with POSIX word splitting, and validates stage commands: stage 0
//! must be a provider binary, later stages must come from a small
//! allowlist of text utilities. No shell is ever involved.

use serde::{Deserialize, Serialize};

use crate::providers::ProviderSpec;

/// Text utilities allowed on the right-hand side of a pipe
pub const ALLOWED_PIPE_UTILITIES: &[&str] =
    &["grep", "head", "tail", "cut", "awk", "sort", "uniq", "wc", "sed"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    Parse(String),
    Validation(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Parse(msg) => write!(f, "parse error: {msg}"),
            PipelineError::Validation(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

/// One command in a `|`-separated sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Trimmed source text of the stage
    pub text: String,
    /// POSIX word-split argv
    pub argv: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn is_piped(&self) -> bool {
        self.stages.len() > 1
    }

    /// The provider stage (stage 0).
    pub fn head(&self) -> &Stage {
        &self.stages[0]
    }
}

/// Split a command on `|` operators that are not inside quotes.
///
/// Rejects unbalanced quotes and the shell metacharacters the gateway
/// never interprets: `;`, `&`, backticks, `$(`, `<` and `>` outside of
/// quotes.
pub fn split(command: &str) -> Result<Vec<String>, PipelineError> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;
    let mut chars = command.chars().peekable();

    while let Some(ch) = chars.next() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if !in_single => {
                current.push(ch);
                escaped = true;
            }
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(ch);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(ch);
            }
            '|' if !in_single && !in_double => {
                segments.push(current.trim().to_string());
                current = String::new();
            }
            ';' | '&' | '`' | '<' | '>' if !in_single && !in_double => {
                return Err(PipelineError::Parse(format!(
                    "shell metacharacter {ch:?} is not allowed"
                )));
            }
            '$' if !in_single && !in_double && chars.peek() == Some(&'(') => {
                return Err(PipelineError::Parse(
                    "command substitution is not allowed".to_string(),
                ));
            }
            _ => current.push(ch),
        }
    }

    if in_single || in_double {
        return Err(PipelineError::Parse("unbalanced quotes".to_string()));
    }
    segments.push(current.trim().to_string());

    if segments.iter().any(|s| s.is_empty()) {
        return Err(PipelineError::Parse("empty pipeline stage".to_string()));
    }
    Ok(segments)
}

/// Split and tokenize a command into pipeline stages.
pub fn parse(command: &str) -> Result<Pipeline, PipelineError> {
    let command = command.trim();
    if command.is_empty() {
        return Err(PipelineError::Parse("empty command".to_string()));
    }

    let mut stages = Vec::new();
    for text in split(command)? {
        let argv = shlex::split(&text)
            .ok_or_else(|| PipelineError::Parse(format!("cannot tokenize stage {text:?}")))?;
        if argv.is_empty() {
            return Err(PipelineError::Parse("empty pipeline stage".to_string()));
        }
        stages.push(Stage { text, argv });
    }
    Ok(Pipeline { stages })
}

/// Validate stage commands against the provider prefix set and the
/// text-utility allowlist.
pub fn validate(spec: &ProviderSpec, pipeline: &Pipeline) -> Result<(), PipelineError> {
    let head = pipeline.head();
    if !spec.is_provider_binary(head.argv[0].as_str()) {
        return Err(PipelineError::Validation(format!(
            "command must start with one of {:?}",
            spec.binaries
        )));
    }

    for stage in &pipeline.stages[1..] {
        let name = stage.argv[0].as_str();
        if !ALLOWED_PIPE_UTILITIES.contains(&name) {
            return Err(PipelineError::Validation(format!(
                "command {name:?} is not allowed in a pipe; permitted utilities: {}",
                ALLOWED_PIPE_UTILITIES.join(", ")
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers;
    use crate::ProviderKind;

    #[test]
    fn splits_on_unquoted_pipes() {
        let stages = split("gcloud compute instances list | grep RUNNING | wc -l").unwrap();
        assert_eq!(
            stages,
            vec![
                "gcloud compute instances list",
                "grep RUNNING",
                "wc -l"
            ]
        );
    }

    #[test]
    fn pipe_inside_quotes_is_literal() {
        let stages = split("aws logs filter-log-events --filter-pattern 'a|b'").unwrap();
        assert_eq!(stages.len(), 1);
    }

    #[test]
    fn rejects_metacharacters() {
        assert!(split("aws s3 ls; rm -rf /").is_err());
        assert!(split("aws s3 ls && whoami").is_err());
        assert!(split("aws s3 ls `whoami`").is_err());
        assert!(split("aws s3 ls $(whoami)").is_err());
        assert!(split("aws s3 ls > /tmp/out").is_err());
        assert!(split("grep x < /etc/passwd").is_err());
    }

    #[test]
    fn metacharacters_in_quotes_are_allowed() {
        let stages = split("aws sns publish --message 'a; b & c'").unwrap();
        assert_eq!(stages.len(), 1);
    }

    #[test]
    fn rejects_unbalanced_quotes() {
        assert!(split("aws s3 ls 'oops").is_err());
    }

    #[test]
    fn rejects_empty_stage() {
        assert!(split("aws s3 ls |").is_err());
        assert!(split("| grep x").is_err());
        assert!(split("aws s3 ls || true").is_err());
    }

    #[test]
    fn parse_tokenizes_each_stage() {
        let pipeline = parse("az vm list | grep \"my vm\"").unwrap();
        assert_eq!(pipeline.stages.len(), 2);
        assert_eq!(pipeline.stages[1].argv, vec!["grep", "my vm"]);
    }

    #[test]
    fn validates_provider_prefix_and_allowlist() {
        let spec = providers::ProviderSpec::for_kind(ProviderKind::Gcp);

        let ok = parse("gcloud compute instances list | grep RUNNING | wc -l").unwrap();
        assert!(validate(&spec, &ok).is_ok());

        let gsutil = parse("gsutil ls | head -5").unwrap();
        assert!(validate(&spec, &gsutil).is_ok());

        let wrong_binary = parse("aws ec2 describe-instances").unwrap();
        assert!(validate(&spec, &wrong_binary).is_err());

        let bad_utility = parse("gcloud projects list | jq .name").unwrap();
        let err = validate(&spec, &bad_utility).unwrap_err();
        assert!(err.to_string().contains("jq"));
    }
}
