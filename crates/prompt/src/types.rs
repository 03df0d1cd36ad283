//! Prompt types for generator input.

use serde::{Deserialize, Serialize};

/// Prompt id used when the generator sees one passage at a time.
pub const SEQUENCE_PROMPT_ID: &str = "rag.sequence";

/// Prompt id used when the generator sees all retrieved passages at once.
pub const TOKEN_PROMPT_ID: &str = "rag.token";

/// A prompt definition loaded from YAML or built in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// System message sent alongside the rendered template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Template string with Handlebars syntax
    pub template: String,

    /// Stop sequences the backend should honor
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

/// Variables available to generator templates.
///
/// `input` is the contextualized generator input
/// (`title / text // question`), `documents` the retrieved passages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptVariables {
    pub question: String,
    pub input: String,
    pub documents: Vec<PromptDocument>,
}

/// A retrieved passage as seen by templates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptDocument {
    /// 1-based rank in retrieval order
    pub rank: usize,
    pub title: String,
    pub text: String,
}

/// A fully built prompt ready for a generator backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuiltPrompt {
    /// System message (optional)
    pub system: Option<String>,

    /// User message (required)
    pub user: String,

    /// Stop sequences carried over from the definition
    pub stop: Vec<String>,

    /// Source prompt ID
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_definition_deserialization() {
        let yaml = r#"
id: rag.sequence
title: Short answer
apiVersion: "1.0"
system: Reply briefly.
template: "{{input}}"
stop: ["\n"]
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.id, SEQUENCE_PROMPT_ID);
        assert_eq!(def.system.as_deref(), Some("Reply briefly."));
        assert_eq!(def.stop, vec!["\n".to_string()]);
    }

    #[test]
    fn test_definition_without_optional_fields() {
        let yaml = r#"
id: custom
title: Custom
apiVersion: "1.0"
template: "{{question}}"
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(def.system.is_none());
        assert!(def.stop.is_empty());
    }
}
