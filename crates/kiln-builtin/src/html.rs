//! `__htmlPlugin`: assembles the application's HTML document.
//!
//! Plugins tap the `html` Transform hook to edit a structured
//! [`HtmlDocument`]; `getHtml` runs the chain over a fresh document and
//! renders it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use kiln_core::{AppError, AppResult};
use kiln_plugin::{
    HookTable, Plugin, PluginContext, PluginFactory, RegisterContext, TransformHook, handler_fn,
    method_fn,
};

use crate::methods::{GET_HTML, resolved_config};

pub const PLUGIN_NAME: &str = "__htmlPlugin";
pub const HTML_HOOK: &str = "html";

/// An HTML page as a list of raw head and body fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlDocument {
    /// `<html lang>`.
    pub lang: String,
    /// `<title>` text.
    pub title: String,
    /// Raw tags inside `<head>`, in order, excluding the title.
    pub head: Vec<String>,
    /// Raw markup inside `<body>`, in order.
    pub body: Vec<String>,
}

impl Default for HtmlDocument {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            title: "Kiln app".to_string(),
            head: vec![
                r#"<meta charset="UTF-8">"#.to_string(),
                r#"<meta http-equiv="X-UA-Compatible" content="IE=edge">"#.to_string(),
                r#"<meta name="viewport" content="width=device-width, initial-scale=1.0">"#
                    .to_string(),
            ],
            body: vec![r#"<div id="root"></div>"#.to_string()],
        }
    }
}

impl HtmlDocument {
    /// Inserts `tag` right after the first `<meta>` tag, or at the top of
    /// `<head>` when there is none.
    pub fn insert_after_first_meta(&mut self, tag: impl Into<String>) {
        let index = self
            .head
            .iter()
            .position(|t| t.trim_start().starts_with("<meta"))
            .map_or(0, |i| i + 1);
        self.head.insert(index, tag.into());
    }

    /// Serializes the document.
    pub fn render(&self) -> String {
        let mut lines = vec![
            "<!DOCTYPE html>".to_string(),
            format!("<html lang=\"{}\">", escape_attr(&self.lang)),
            "<head>".to_string(),
        ];
        lines.extend(self.head.iter().map(|tag| format!("  {tag}")));
        lines.push(format!("  <title>{}</title>", escape_text(&self.title)));
        lines.push("</head>".to_string());
        lines.push("<body>".to_string());
        lines.extend(self.body.iter().map(|fragment| format!("  {fragment}")));
        lines.push("</body>".to_string());
        lines.push("</html>".to_string());

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

/// `<public_path>/favicon.ico`, with exactly one separator.
pub fn favicon_href(public_path: &str) -> String {
    let base = public_path.trim_end_matches('/');
    format!("{base}/favicon.ico")
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

/// Factory for the html plugin.
pub fn factory() -> PluginFactory {
    Arc::new(|context: PluginContext, _: Value| -> AppResult<Arc<dyn Plugin>> {
        Ok(Arc::new(HtmlPlugin {
            context,
            hook: TransformHook::new(HTML_HOOK),
        }))
    })
}

struct HtmlPlugin {
    context: PluginContext,
    hook: TransformHook<HtmlDocument>,
}

#[async_trait]
impl Plugin for HtmlPlugin {
    fn name(&self) -> Option<&str> {
        Some(PLUGIN_NAME)
    }

    async fn register(&self, ctx: &RegisterContext) -> AppResult<()> {
        ctx.add_new_hook(HTML_HOOK, self.hook.binder(), false).await;

        let hook = self.hook.clone();
        ctx.add_new_method(
            GET_HTML,
            method_fn(move |_| {
                let hook = hook.clone();
                async move {
                    let document = hook.call(HtmlDocument::default(), Value::Null).await?;
                    Ok(Value::String(document.render()))
                }
            }),
            false,
        )
        .await;
        Ok(())
    }

    fn hooks(&self) -> HookTable {
        let context = self.context.clone();
        HookTable::new().tap(
            HTML_HOOK,
            handler_fn(move |document, _| {
                let context = context.clone();
                async move {
                    let config = resolved_config(context.methods()).await?;
                    let mut document: HtmlDocument =
                        serde_json::from_value(document).map_err(|e| {
                            AppError::hook(format!("html document has the wrong shape: {e}"))
                        })?;
                    document.insert_after_first_meta(format!(
                        r#"<link rel="icon" href="{}" />"#,
                        escape_attr(&favicon_href(&config.public_path))
                    ));
                    Ok(serde_json::to_value(document)?)
                }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_favicon_href() {
        assert_eq!(favicon_href("/"), "/favicon.ico");
        assert_eq!(favicon_href(""), "/favicon.ico");
        assert_eq!(favicon_href("/static/"), "/static/favicon.ico");
        assert_eq!(favicon_href("https://cdn.example.com/app"), "https://cdn.example.com/app/favicon.ico");
    }

    #[test]
    fn test_insert_after_first_meta() {
        let mut doc = HtmlDocument::default();
        doc.insert_after_first_meta("<link>");
        assert_eq!(doc.head[1], "<link>");

        let mut bare = HtmlDocument {
            head: Vec::new(),
            ..HtmlDocument::default()
        };
        bare.insert_after_first_meta("<link>");
        assert_eq!(bare.head, vec!["<link>"]);
    }

    #[test]
    fn test_render_escapes_title() {
        let doc = HtmlDocument {
            title: "A & B".into(),
            ..HtmlDocument::default()
        };
        let html = doc.render();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>A &amp; B</title>"));
        assert!(html.contains(r#"<div id="root"></div>"#));
    }
}
