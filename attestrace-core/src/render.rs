//! Share-page rendering

use std::sync::Arc;

/// Marker replaced by the trace JSON
pub const JSON_PLACEHOLDER: &str = "[[ADD_JSON_HERE]]";

const BUILTIN_TEMPLATE: &str = include_str!("../templates/chat_template.html");

/// HTML template for shared traces, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ShareTemplate {
    source: Arc<str>,
}

impl ShareTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        let source: String = source.into();
        if !source.contains(JSON_PLACEHOLDER) {
            tracing::warn!(
                placeholder = JSON_PLACEHOLDER,
                "Share template has no placeholder, rendered pages will not contain the trace"
            );
        }
        Self {
            source: source.into(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(BUILTIN_TEMPLATE)
    }

    /// Substitute `trace_json` for every placeholder occurrence.
    ///
    /// `</` is written as `<\/` so the JSON cannot close the surrounding
    /// script element; the result still parses to the same JSON value.
    pub fn render(&self, trace_json: &str) -> String {
        let embedded = trace_json.replace("</", "<\\/");
        self.source.replace(JSON_PLACEHOLDER, &embedded)
    }
}

impl Default for ShareTemplate {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_template_has_placeholder() {
        assert!(BUILTIN_TEMPLATE.contains(JSON_PLACEHOLDER));
    }

    #[test]
    fn test_render_substitutes_json() {
        let template = ShareTemplate::new("<pre>[[ADD_JSON_HERE]]</pre>");
        assert_eq!(
            template.render(r#"{"id":"1"}"#),
            r#"<pre>{"id":"1"}</pre>"#
        );
    }

    #[test]
    fn test_render_replaces_every_occurrence() {
        let template = ShareTemplate::new("[[ADD_JSON_HERE]]|[[ADD_JSON_HERE]]");
        assert_eq!(template.render("{}"), "{}|{}");
    }

    #[test]
    fn test_render_neutralises_script_close() {
        let template = ShareTemplate::builtin();
        let json = r#"{"content":"</script><script>alert(1)</script>"}"#;
        let html = template.render(json);

        assert!(!html.contains("</script><script>alert(1)"));
        let embedded = r#"{"content":"<\/script><script>alert(1)<\/script>"}"#;
        assert!(html.contains(embedded));

        let reparsed: serde_json::Value = serde_json::from_str(embedded).unwrap();
        assert_eq!(reparsed["content"], "</script><script>alert(1)</script>");
    }

    #[test]
    fn test_template_without_placeholder_renders_unchanged() {
        let template = ShareTemplate::new("<p>static</p>");
        assert_eq!(template.render("{}"), "<p>static</p>");
    }
}
