//! Ticket text templates
//!
//! Templates are handlebars sources rendered as plain text (no HTML escaping)
//! with strict mode on. Only bare `{{name}}` references are accepted, and each
//! template declares the names it may use. Unknown names are rejected when the
//! template is registered, and rendering reports every missing argument at once.

use std::collections::{BTreeMap, BTreeSet};

use handlebars::template::TemplateElement;
use handlebars::{Handlebars, Template};

use crate::error::{Result, TicketError};

/// Placeholder names understood by the new-ticket templates
pub mod placeholders {
    pub const ALARM_ID: &str = "alarm_id";
    pub const DESCRIPTION: &str = "description";
    pub const HOST: &str = "host";
    pub const AGE: &str = "age";
    pub const SEVERITY: &str = "severity";
    pub const EXPIRATION: &str = "expiration";

    pub const NEW_TICKET: &[&str] = &[ALARM_ID, DESCRIPTION, HOST, AGE, SEVERITY, EXPIRATION];

    /// Reminder comments are static text
    pub const NONE: &[&str] = &[];
}

pub const NEW_SUBJECT: &str = "new_subject";
pub const NEW_BODY: &str = "new_body";
pub const UPDATE_BODY: &str = "update_body";

pub const DEFAULT_NEW_SUBJECT: &str =
    "[ticketsrv] Issue '{{description}}' found in host {{host}} (ID: {{alarm_id}}).";

pub const DEFAULT_NEW_BODY: &str = "\
Alarm '{{description}}' has not been resolved within its defined
severity expiration ({{expiration}} seconds).

** Details **

- Host: {{host}}.
- Description: {{description}}.
- Severity: {{severity}}.
- Age: {{age}}.

** Please take the appropriate actions to resolve the issue.

-- Ticket automatically created by ticketsrv. --
";

pub const DEFAULT_UPDATE_BODY: &str = "\
Friendly reminder for acting in the problem described above.

Please take the appropriate actions to resolve the issue.

Ticket automatically updated by ticketsrv.
";

/// Placeholder values for one rendering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    values: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Names referenced by a compiled template
///
/// Helpers, blocks, partials and decorators are refused so that every
/// reference is a plain lookup into the context.
fn referenced_names(name: &str, template: &Template) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for element in &template.elements {
        match element {
            TemplateElement::RawString(_) | TemplateElement::Comment(_) => {},
            TemplateElement::Expression(expr) | TemplateElement::HtmlExpression(expr) => {
                if !expr.params.is_empty() || !expr.hash.is_empty() {
                    return Err(TicketError::Config(format!(
                        "template '{}' calls a helper; only plain {{{{name}}}} references are supported",
                        name
                    )));
                }
                match expr.name.as_name() {
                    Some(reference) => {
                        names.insert(reference.trim().to_string());
                    },
                    None => {
                        return Err(TicketError::Config(format!(
                            "template '{}' has an unsupported expression",
                            name
                        )))
                    },
                }
            },
            _ => {
                return Err(TicketError::Config(format!(
                    "template '{}' uses blocks or partials; only plain {{{{name}}}} references are supported",
                    name
                )))
            },
        }
    }
    Ok(names)
}

/// Rendered subject and body of a new ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTicket {
    pub subject: String,
    pub body: String,
}

/// The set of templates the service renders
#[derive(Debug, Clone)]
pub struct TicketTemplates {
    registry: Handlebars<'static>,
    used: BTreeMap<&'static str, BTreeSet<String>>,
}

impl TicketTemplates {
    pub fn new(new_subject: &str, new_body: &str, update_body: &str) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);

        let mut templates = Self {
            registry,
            used: BTreeMap::new(),
        };
        templates.register(NEW_SUBJECT, new_subject, placeholders::NEW_TICKET)?;
        templates.register(NEW_BODY, new_body, placeholders::NEW_TICKET)?;
        templates.register(UPDATE_BODY, update_body, placeholders::NONE)?;
        Ok(templates)
    }

    /// Compile `source` and register it, allowing only the names in `allowed`
    fn register(&mut self, name: &'static str, source: &str, allowed: &[&str]) -> Result<()> {
        let template = Template::compile(source)
            .map_err(|e| TicketError::Config(format!("template '{}' does not compile: {}", name, e)))?;

        let used = referenced_names(name, &template)?;
        if let Some(unknown) = used.iter().find(|n| !allowed.contains(&n.as_str())) {
            return Err(TicketError::UnknownPlaceholder {
                template: name.to_string(),
                placeholder: unknown.clone(),
            });
        }

        self.registry.register_template(name, template);
        self.used.insert(name, used);
        Ok(())
    }

    /// Templates shipped with the service
    pub fn builtin() -> Result<Self> {
        Self::new(DEFAULT_NEW_SUBJECT, DEFAULT_NEW_BODY, DEFAULT_UPDATE_BODY)
    }

    /// Placeholder names the registered template `name` uses
    pub fn placeholders(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.used.get(name)
    }

    /// Used placeholders of the given templates absent from `ctx`, sorted
    fn missing(&self, names: &[&str], ctx: &TemplateContext) -> Vec<String> {
        names
            .iter()
            .filter_map(|name| self.used.get(name))
            .flatten()
            .filter(|p| ctx.get(p).is_none())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn render(&self, name: &str, ctx: &TemplateContext) -> Result<String> {
        self.registry
            .render(name, &ctx.values)
            .map_err(|e| TicketError::Config(format!("template '{}' failed to render: {}", name, e)))
    }

    /// Render subject and body, or fail listing what both of them miss
    pub fn render_new(&self, ctx: &TemplateContext) -> Result<RenderedTicket> {
        let missing = self.missing(&[NEW_SUBJECT, NEW_BODY], ctx);
        if !missing.is_empty() {
            return Err(TicketError::MissingTemplateArgument {
                template: "new_ticket".to_string(),
                missing,
            });
        }

        Ok(RenderedTicket {
            subject: self.render(NEW_SUBJECT, ctx)?,
            body: self.render(NEW_BODY, ctx)?,
        })
    }

    pub fn render_update(&self) -> Result<String> {
        self.render(UPDATE_BODY, &TemplateContext::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_context() -> TemplateContext {
        TemplateContext::new()
            .with(placeholders::ALARM_ID, "T-42")
            .with(placeholders::DESCRIPTION, "Disk full")
            .with(placeholders::HOST, "db01")
            .with(placeholders::AGE, "1h 0m 1s")
            .with(placeholders::SEVERITY, "Average")
            .with(placeholders::EXPIRATION, "3600")
    }

    #[test]
    fn test_render_default_templates() {
        let templates = TicketTemplates::builtin().unwrap();
        let rendered = templates.render_new(&full_context()).unwrap();

        assert_eq!(
            rendered.subject,
            "[ticketsrv] Issue 'Disk full' found in host db01 (ID: T-42)."
        );
        assert!(rendered.body.contains("- Host: db01."));
        assert!(rendered.body.contains("(3600 seconds)"));
        assert!(templates.render_update().unwrap().contains("Friendly reminder"));
    }

    #[test]
    fn test_missing_arguments_are_all_reported() {
        let templates = TicketTemplates::builtin().unwrap();
        let mut ctx = full_context();
        ctx.remove(placeholders::HOST);
        ctx.remove(placeholders::AGE);

        match templates.render_new(&ctx) {
            Err(TicketError::MissingTemplateArgument { missing, .. }) => {
                assert_eq!(missing, vec!["age".to_string(), "host".to_string()]);
            },
            other => panic!("expected MissingTemplateArgument, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_placeholder_rejected_at_registration() {
        let result = TicketTemplates::new("Alarm {{alarm}} on {{host}}", "{{host}}", "static");
        assert!(matches!(
            result,
            Err(TicketError::UnknownPlaceholder { ref template, ref placeholder })
                if template == NEW_SUBJECT && placeholder == "alarm"
        ));

        let result = TicketTemplates::new("{{host}}", "{{host}}", "Reminder for {{host}}");
        assert!(matches!(
            result,
            Err(TicketError::UnknownPlaceholder { ref template, .. }) if template == UPDATE_BODY
        ));
    }

    #[test]
    fn test_helpers_and_bad_syntax_rejected() {
        assert!(matches!(
            TicketTemplates::new("{{#if host}}x{{/if}}", "{{host}}", "static"),
            Err(TicketError::Config(_))
        ));
        assert!(matches!(
            TicketTemplates::new("{{lookup host 0}}", "{{host}}", "static"),
            Err(TicketError::Config(_))
        ));
        assert!(matches!(
            TicketTemplates::new("oops {{host", "{{host}}", "static"),
            Err(TicketError::Config(_))
        ));
    }

    #[test]
    fn test_plain_text_is_not_escaped() {
        let templates = TicketTemplates::new("{{ host }}", "{{description}}", "static").unwrap();
        let ctx = full_context()
            .with(placeholders::HOST, "<db01>")
            .with(placeholders::DESCRIPTION, "a & b 'quoted'");

        let rendered = templates.render_new(&ctx).unwrap();
        assert_eq!(rendered.subject, "<db01>");
        assert_eq!(rendered.body, "a & b 'quoted'");
    }

    #[test]
    fn test_used_placeholders_recorded() {
        let templates = TicketTemplates::new("only {{host}}", "{{host}} {{age}}", "static").unwrap();
        let subject = templates.placeholders(NEW_SUBJECT).unwrap();
        assert_eq!(subject.len(), 1);
        assert!(subject.contains("host"));
        assert_eq!(templates.placeholders(NEW_BODY).unwrap().len(), 2);
        assert!(templates.placeholders(UPDATE_BODY).unwrap().is_empty());

        let rendered = templates.render_new(&full_context()).unwrap();
        assert_eq!(rendered.subject, "only db01");
    }
}
