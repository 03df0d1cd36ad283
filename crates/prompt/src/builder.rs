//! Prompt builder for rendering generator templates.

use crate::types::{BuiltPrompt, PromptDefinition, PromptVariables};
use handlebars::Handlebars;
use ragqa_core::{AppError, AppResult};

/// Build a prompt from a definition and the generator input variables.
///
/// # Example
/// ```no_run
/// use ragqa_prompt::{build_prompt, default_prompt, PromptVariables, SEQUENCE_PROMPT_ID};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let def = default_prompt(SEQUENCE_PROMPT_ID)?;
/// let vars = PromptVariables {
///     question: "who invented calculus".to_string(),
///     input: "Isaac Newton / ... // who invented calculus".to_string(),
///     documents: Vec::new(),
/// };
/// let built = build_prompt(&def, &vars)?;
/// println!("{}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: &PromptVariables,
) -> AppResult<BuiltPrompt> {
    tracing::trace!("Building prompt: {}", definition.id);

    let user = render_template(&definition.template, variables)?;

    Ok(BuiltPrompt {
        system: definition.system.clone(),
        user,
        stop: definition.stop.clone(),
        source_prompt_id: definition.id.clone(),
    })
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &PromptVariables) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Passages are plain text
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PromptDocument;

    fn variables() -> PromptVariables {
        PromptVariables {
            question: "who sings does he love me with reba".to_string(),
            input: "Linda Davis / Linda Kaye Davis is a singer // who sings does he love me with reba"
                .to_string(),
            documents: vec![
                PromptDocument {
                    rank: 1,
                    title: "Linda Davis".to_string(),
                    text: "Linda Kaye Davis is a singer".to_string(),
                },
                PromptDocument {
                    rank: 2,
                    title: "Reba McEntire".to_string(),
                    text: "Reba Nell McEntire is a singer".to_string(),
                },
            ],
        }
    }

    fn definition(template: &str) -> PromptDefinition {
        PromptDefinition {
            id: "test.prompt".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            system: Some("Be brief.".to_string()),
            template: template.to_string(),
            stop: vec!["\n".to_string()],
        }
    }

    #[test]
    fn test_render_input_variable() {
        let built = build_prompt(&definition("{{input}}"), &variables()).unwrap();
        assert!(built.user.starts_with("Linda Davis / "));
        assert_eq!(built.system.as_deref(), Some("Be brief."));
        assert_eq!(built.source_prompt_id, "test.prompt");
    }

    #[test]
    fn test_render_documents_loop() {
        let template = "{{#each documents}}[{{rank}}] {{title}}\n{{/each}}Q: {{question}}";
        let built = build_prompt(&definition(template), &variables()).unwrap();
        assert!(built.user.contains("[1] Linda Davis"));
        assert!(built.user.contains("[2] Reba McEntire"));
        assert!(built.user.ends_with("Q: who sings does he love me with reba"));
    }

    #[test]
    fn test_no_html_escaping() {
        let mut vars = variables();
        vars.question = "what is <b> & \"x\"".to_string();
        let built = build_prompt(&definition("{{question}}"), &vars).unwrap();
        assert_eq!(built.user, "what is <b> & \"x\"");
    }

    #[test]
    fn test_invalid_template() {
        let result = build_prompt(&definition("{{#each documents}}"), &variables());
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }
}
