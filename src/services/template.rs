//! Notification templates and `{token}` rendering.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Channel, NotificationCategory, NotificationTemplate, Priority, RenderedMessage};

/// Values substituted into templates.
pub type TemplateData = BTreeMap<String, String>;

fn builtin(id: &str, channel: Channel, priority: Priority, subject: &str, body: &str) -> NotificationTemplate {
    NotificationTemplate {
        id: id.to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        channel,
        priority,
        category: NotificationCategory::StatusChange,
    }
}

/// Templates shipped with privflow.
pub fn builtin_templates() -> Vec<NotificationTemplate> {
    vec![
        builtin(
            "pta_required",
            Channel::Email,
            Priority::High,
            "PTA required: {title}",
            "\"{title}\" has moved to {new_stage_title} and needs a Privacy Threshold Assessment.\n\
             A draft assessment has been opened and linked to the collection.\n\n\
             Changed by: {actor}\nReference: {artifact_id}",
        ),
        builtin(
            "pia_required",
            Channel::Email,
            Priority::High,
            "PIA required: {title}",
            "The threshold assessment for \"{title}\" concluded that a Privacy Impact Assessment is needed.\n\
             A draft assessment has been opened and linked to the collection.\n\n\
             Changed by: {actor}\nReference: {artifact_id}",
        ),
        builtin(
            "stage_changed",
            Channel::Email,
            Priority::Normal,
            "{title} moved to {new_stage_title}",
            "\"{title}\" moved from {old_stage_title} to {new_stage_title}.\n\n\
             Changed by: {actor}\nReference: {artifact_id}",
        ),
        builtin(
            "review_requested",
            Channel::Email,
            Priority::Normal,
            "Review requested: {title}",
            "\"{title}\" is ready for {new_stage_title}.\n\n\
             Submitted by: {actor}\nReference: {artifact_id}",
        ),
        builtin(
            "approved",
            Channel::Email,
            Priority::Normal,
            "Approved: {title}",
            "\"{title}\" has been approved by {actor}.\n\nReference: {artifact_id}",
        ),
        builtin(
            "dependent_created",
            Channel::Dashboard,
            Priority::Normal,
            "New {dependent_kind} for {title}",
            "A {dependent_kind} ({dependent_id}) was created for \"{title}\".",
        ),
        builtin(
            "deadline_approaching",
            Channel::Email,
            Priority::Normal,
            "{title}: {stage_title} due in {days_until_due} days",
            "\"{title}\" is due to leave {stage_title} by {due_date}.\n\n\
             Reminder {sequence} of {total_expected}.\nReference: {artifact_id}",
        ),
        builtin(
            "deadline_overdue",
            Channel::Email,
            Priority::High,
            "OVERDUE: {title} ({stage_title})",
            "\"{title}\" was due to leave {stage_title} on {due_date} and is {days_overdue} days overdue.\n\n\
             Reminder {sequence} of {total_expected}.\nReference: {artifact_id}",
        ),
        builtin(
            "periodic_review_due",
            Channel::Email,
            Priority::Normal,
            "Periodic review due: {title}",
            "\"{title}\" has reached its periodic review. Confirm the collection is still accurate \
             or start its retirement.\n\nReference: {artifact_id}",
        ),
    ]
}

/// Immutable registry of templates keyed by id.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<String, NotificationTemplate>,
}

impl TemplateRegistry {
    pub fn new(templates: Vec<NotificationTemplate>) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_templates())
    }

    /// Builtins overlaid with `<id>.txt` files from `dir`.
    ///
    /// The first line of a file is the subject and the rest is the body.
    /// Overrides keep the channel and priority of the builtin they replace;
    /// new ids default to email at normal priority.
    pub fn with_overrides(dir: &Path) -> DomainResult<Self> {
        let mut registry = Self::builtin();

        let entries = std::fs::read_dir(dir).map_err(|e| {
            DomainError::Configuration(format!("cannot read templates dir {}: {e}", dir.display()))
        })?;

        for entry in entries {
            let path = entry
                .map_err(|e| DomainError::Configuration(format!("cannot read templates dir entry: {e}")))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            let content = std::fs::read_to_string(&path).map_err(|e| {
                DomainError::Configuration(format!("cannot read template {}: {e}", path.display()))
            })?;
            let (subject, body) = content.split_once('\n').unwrap_or((content.as_str(), ""));

            let base = registry
                .templates
                .get(&id)
                .cloned()
                .unwrap_or_else(|| builtin(&id, Channel::Email, Priority::Normal, "", ""));
            let template = NotificationTemplate {
                subject: subject.trim_end_matches('\r').to_string(),
                body: body.to_string(),
                ..base
            };

            tracing::debug!(template_id = %id, path = %path.display(), "loaded template override");
            registry.templates.insert(id, template);
        }

        Ok(registry)
    }

    pub fn get(&self, id: &str) -> DomainResult<&NotificationTemplate> {
        self.templates
            .get(id)
            .ok_or_else(|| DomainError::TemplateNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// Template ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// Replace `{key}` tokens with values from `data`.
///
/// Tokens with no value are left verbatim and reported in the second element.
/// Braces that do not enclose a plain identifier are copied unchanged.
pub fn render_text(pattern: &str, data: &TemplateData) -> (String, Vec<String>) {
    let mut out = String::with_capacity(pattern.len());
    let mut missing = Vec::new();
    let mut rest = pattern;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let token = after.find('}').map(|close| &after[..close]).filter(|t| is_token(t));

        match token {
            Some(key) => {
                match data.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                        if !missing.iter().any(|m| m == key) {
                            missing.push(key.to_string());
                        }
                    }
                }
                rest = &after[key.len() + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    (out, missing)
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Render a template's subject and body.
pub fn render(template: &NotificationTemplate, data: &TemplateData) -> RenderedMessage {
    let (subject, mut missing) = render_text(&template.subject, data);
    let (body, body_missing) = render_text(&template.body, data);
    for key in body_missing {
        if !missing.contains(&key) {
            missing.push(key);
        }
    }

    if !missing.is_empty() {
        tracing::warn!(
            template_id = %template.id,
            missing = ?missing,
            "template rendered with unresolved placeholders"
        );
    }

    RenderedMessage {
        template_id: template.id.clone(),
        subject,
        body,
        priority: template.priority,
        missing_tokens: missing,
    }
}
