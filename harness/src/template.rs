//! Message templates rendered with minijinja.

use std::sync::LazyLock;

use minijinja::Environment;
use serde::Serialize;
use tracing::warn;

use crate::error::HarnessError;

static ENV: LazyLock<Environment<'static>> = LazyLock::new(Environment::new);

/// Compile `template` without rendering it.
pub fn check(name: &str, template: &str) -> Result<(), HarnessError> {
    let env = Environment::new();
    let compiled = env.template_from_str(template).map(|_| ());
    compiled.map_err(|source| HarnessError::InvalidTemplate {
        name: name.to_string(),
        source,
    })
}

pub fn render<S: Serialize>(template: &str, ctx: S) -> Result<String, minijinja::Error> {
    ENV.render_str(template, ctx)
}

/// Render `template`, falling back to the raw text if rendering fails.
pub fn render_or_raw<S: Serialize>(template: &str, ctx: S) -> String {
    render(template, ctx).unwrap_or_else(|err| {
        warn!(error = %err, template, "message template failed to render");
        template.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn renders_named_values() {
        let out =
            render("Running action {{ name }}", context! { name => "build" }).expect("render");
        assert_eq!(out, "Running action build");
    }

    #[test]
    fn check_rejects_unclosed_block() {
        let err = check("run_message", "{{ name").expect_err("invalid");
        assert!(matches!(err, HarnessError::InvalidTemplate { .. }));
    }

    #[test]
    fn render_or_raw_falls_back_on_error() {
        assert_eq!(render_or_raw("{% if %}", context! {}), "{% if %}");
    }
}
