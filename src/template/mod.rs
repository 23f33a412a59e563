//! Jinja2-compatible template rendering
//!
//! Renders the shim script templates. Undefined variables are an error.

use crate::TesterError;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use tracing::debug;

/// Render a named template with a serializable context
pub fn render_template<S: Serialize>(
    name: &str,
    template: &str,
    context: S,
) -> Result<String, TesterError> {
    debug!("Rendering template: {}", name);

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);

    env.add_template(name, template)
        .map_err(|e| TesterError::Template(format!("Template parse error: {}", e)))?;

    let tmpl = env
        .get_template(name)
        .map_err(|e| TesterError::Template(format!("Template error: {}", e)))?;

    tmpl.render(context)
        .map_err(|e| TesterError::Template(format!("Template render error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_render_simple_template() {
        let mut ctx = HashMap::new();
        ctx.insert("endpoint", "https://nova.example.com/v2.1");

        let rendered = render_template("t", "url={{ endpoint }}/servers\n", &ctx).unwrap();
        assert_eq!(rendered, "url=https://nova.example.com/v2.1/servers\n");
    }

    #[test]
    fn test_shell_syntax_passes_through() {
        let ctx: HashMap<&str, &str> = HashMap::new();
        let script = "code=$?\nID=$(curl -s x)\n$headers = @{ 'a' = 1 }\n";

        let rendered = render_template("t", script, &ctx).unwrap();
        assert_eq!(rendered, script);
    }

    #[test]
    fn test_render_missing_variable() {
        let ctx: HashMap<&str, &str> = HashMap::new();

        let result = render_template("t", "value: {{ missing_var }}", &ctx);
        assert!(matches!(result, Err(TesterError::Template(_))));
    }

    #[test]
    fn test_render_invalid_syntax() {
        let ctx: HashMap<&str, &str> = HashMap::new();

        let result = render_template("t", "value: {{ invalid", &ctx);
        assert!(result.is_err());
    }
}
