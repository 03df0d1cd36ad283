//! Prompt loader for generator templates.
//!
//! Workspace overrides live under `.ragqa/prompts/<id>.yml`. When no
//! override exists the built-in definition for the id is used.

use crate::types::{PromptDefinition, SEQUENCE_PROMPT_ID, TOKEN_PROMPT_ID};
use ragqa_core::{AppError, AppResult};
use std::path::Path;

const DEFAULT_SYSTEM: &str =
    "You answer open-domain questions with a short factual phrase. Reply with the answer only.";

const SEQUENCE_TEMPLATE: &str = "{{input}}\n\nAnswer:";

const TOKEN_TEMPLATE: &str = "{{#each documents}}{{title}} / {{text}}\n{{/each}}// {{question}}\n\nAnswer:";

/// Built-in prompt definition for a known id.
pub fn default_prompt(prompt_id: &str) -> AppResult<PromptDefinition> {
    let (title, template) = match prompt_id {
        SEQUENCE_PROMPT_ID => ("Answer from a single passage", SEQUENCE_TEMPLATE),
        TOKEN_PROMPT_ID => ("Answer from all retrieved passages", TOKEN_TEMPLATE),
        other => {
            return Err(AppError::Prompt(format!(
                "No built-in prompt named '{}'",
                other
            )))
        }
    };

    Ok(PromptDefinition {
        id: prompt_id.to_string(),
        title: title.to_string(),
        api_version: "1.0".to_string(),
        system: Some(DEFAULT_SYSTEM.to_string()),
        template: template.to_string(),
        stop: vec!["\n".to_string()],
    })
}

/// Load a prompt definition by ID, preferring the workspace override.
///
/// # Example
/// ```no_run
/// use ragqa_prompt::{load_prompt, TOKEN_PROMPT_ID};
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new(".ragqa"), TOKEN_PROMPT_ID)?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(state_dir: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = state_dir.join("prompts").join(format!("{}.yml", prompt_id));

    if !prompt_file.exists() {
        tracing::debug!("No prompt override at {:?}, using built-in", prompt_file);
        return default_prompt(prompt_id);
    }

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_prompt(&definition)?;

    if definition.id != prompt_id {
        return Err(AppError::Prompt(format!(
            "Prompt file {:?} declares id '{}', expected '{}'",
            prompt_file, definition.id, prompt_id
        )));
    }

    tracing::info!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_prompt(state_dir: &Path, id: &str, content: &str) {
        let prompts_dir = state_dir.join("prompts");
        fs::create_dir_all(&prompts_dir).unwrap();
        fs::write(prompts_dir.join(format!("{}.yml", id)), content).unwrap();
    }

    #[test]
    fn test_builtin_prompts() {
        let seq = default_prompt(SEQUENCE_PROMPT_ID).unwrap();
        assert!(seq.template.contains("{{input}}"));

        let tok = default_prompt(TOKEN_PROMPT_ID).unwrap();
        assert!(tok.template.contains("{{#each documents}}"));
        assert!(validate_prompt(&tok).is_ok());
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(matches!(
            default_prompt("rag.unknown"),
            Err(AppError::Prompt(_))
        ));
    }

    #[test]
    fn test_load_falls_back_to_builtin() {
        let temp_dir = TempDir::new().unwrap();
        let prompt = load_prompt(temp_dir.path(), SEQUENCE_PROMPT_ID).unwrap();
        assert_eq!(prompt, default_prompt(SEQUENCE_PROMPT_ID).unwrap());
    }

    #[test]
    fn test_load_workspace_override() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            TOKEN_PROMPT_ID,
            r#"
id: rag.token
title: "Terse"
apiVersion: "1.1"
template: "Q: {{question}}"
"#,
        );

        let prompt = load_prompt(temp_dir.path(), TOKEN_PROMPT_ID).unwrap();
        assert_eq!(prompt.title, "Terse");
        assert_eq!(prompt.template, "Q: {{question}}");
        assert!(prompt.system.is_none());
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), TOKEN_PROMPT_ID, "invalid: yaml: content:");

        assert!(load_prompt(temp_dir.path(), TOKEN_PROMPT_ID).is_err());
    }

    #[test]
    fn test_load_rejects_bad_api_version() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            SEQUENCE_PROMPT_ID,
            "id: rag.sequence\ntitle: T\napiVersion: \"1\"\ntemplate: \"{{input}}\"\n",
        );

        let err = load_prompt(temp_dir.path(), SEQUENCE_PROMPT_ID).unwrap_err();
        assert!(err.to_string().contains("apiVersion"));
    }

    #[test]
    fn test_load_rejects_mismatched_id() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            SEQUENCE_PROMPT_ID,
            "id: other\ntitle: T\napiVersion: \"1.0\"\ntemplate: \"{{input}}\"\n",
        );

        assert!(load_prompt(temp_dir.path(), SEQUENCE_PROMPT_ID).is_err());
    }
}
