//! Prompt catalog
//!
//! Loads Indonesian message templates (`.pmt` files) for the confirmation
//! dialogue. Override directories from configuration are checked first,
//! with embedded defaults compiled into the binary as the fallback.
//!
//! Templates use Handlebars syntax for variable substitution.

use std::collections::HashMap;
use std::path::PathBuf;

use eyre::{Result, eyre};
use handlebars::Handlebars;
use tracing::debug;

use crate::config::PromptsConfig;
use crate::domain::ConvoState;

// Embedded templates, compiled into the binary from .pmt files.

/// Initial confirmation request with session details
pub const CONFIRM_REQUEST: &str = include_str!("../../prompts/confirm-request.pmt");

/// Decline-or-reschedule menu after a "tidak bisa" reply
pub const DECISION_MENU: &str = include_str!("../../prompts/decision-menu.pmt");

/// Free-text ask for a decline reason
pub const DECLINE_REASON: &str = include_str!("../../prompts/decline-reason.pmt");

/// Free-text ask for a reschedule reason
pub const RESCHEDULE_REASON: &str = include_str!("../../prompts/reschedule-reason.pmt");

/// Closing message after an accept
pub const CLOSING_CONFIRMED: &str = include_str!("../../prompts/closing-confirmed.pmt");

/// Closing message after a decline reason was stored
pub const CLOSING_DECLINED: &str = include_str!("../../prompts/closing-declined.pmt");

/// Closing message after a reschedule request was filed
pub const CLOSING_RESCHEDULE: &str = include_str!("../../prompts/closing-reschedule.pmt");

/// Nudge for unrecognized input at the bisa / tidak bisa step
pub const REPROMPT_BUTTON: &str = include_str!("../../prompts/reprompt-button.pmt");

/// Nudge for unrecognized input at the 1 / 2 menu step
pub const REPROMPT_DECISION: &str = include_str!("../../prompts/reprompt-decision.pmt");

/// Nudge for an empty reason reply
pub const REPROMPT_REASON: &str = include_str!("../../prompts/reprompt-reason.pmt");

/// Get the embedded template by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "confirm-request" => Some(CONFIRM_REQUEST),
        "decision-menu" => Some(DECISION_MENU),
        "decline-reason" => Some(DECLINE_REASON),
        "reschedule-reason" => Some(RESCHEDULE_REASON),
        "closing-confirmed" => Some(CLOSING_CONFIRMED),
        "closing-declined" => Some(CLOSING_DECLINED),
        "closing-reschedule" => Some(CLOSING_RESCHEDULE),
        "reprompt-button" => Some(REPROMPT_BUTTON),
        "reprompt-decision" => Some(REPROMPT_DECISION),
        "reprompt-reason" => Some(REPROMPT_REASON),
        _ => None,
    }
}

/// Template shown when a conversation enters a waiting state
pub fn state_template(state: &ConvoState) -> Option<&'static str> {
    debug!(?state, "state_template: called");
    match state {
        ConvoState::WaitingButtonChoice => Some("confirm-request"),
        ConvoState::WaitingDecisionChoice => Some("decision-menu"),
        ConvoState::WaitingDeclineReason => Some("decline-reason"),
        ConvoState::WaitingRescheduleReason => Some("reschedule-reason"),
        ConvoState::Completed | ConvoState::Cancelled => None,
    }
}

/// Template shown when input for the current state is not recognized
pub fn reprompt_template(state: &ConvoState) -> Option<&'static str> {
    debug!(?state, "reprompt_template: called");
    match state {
        ConvoState::WaitingButtonChoice => Some("reprompt-button"),
        ConvoState::WaitingDecisionChoice => Some("reprompt-decision"),
        ConvoState::WaitingDeclineReason | ConvoState::WaitingRescheduleReason => Some("reprompt-reason"),
        ConvoState::Completed | ConvoState::Cancelled => None,
    }
}

/// Loads and renders message templates
pub struct PromptCatalog {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// Existing override directories, in configuration order
    override_dirs: Vec<PathBuf>,
    /// Whether embedded defaults are consulted
    use_builtin: bool,
}

impl PromptCatalog {
    /// Create a catalog from configuration
    pub fn from_config(config: &PromptsConfig) -> Self {
        debug!(paths = ?config.paths, "PromptCatalog::from_config: called");
        let override_dirs: Vec<PathBuf> = config.expanded_paths().into_iter().filter(|p| p.exists()).collect();
        debug!(
            dir_count = override_dirs.len(),
            "PromptCatalog::from_config: existing override directories"
        );

        let mut hbs = Handlebars::new();
        // Messages go to a plain-text channel, not HTML
        hbs.register_escape_fn(handlebars::no_escape);

        Self {
            hbs,
            override_dirs,
            use_builtin: config.use_builtin(),
        }
    }

    /// Create a catalog that only uses embedded templates (for testing)
    pub fn builtin_only() -> Self {
        debug!("PromptCatalog::builtin_only: called");
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);

        Self {
            hbs,
            override_dirs: Vec::new(),
            use_builtin: true,
        }
    }

    /// Load a template by name
    ///
    /// Override directories are checked in configuration order and the
    /// first match wins; embedded defaults apply when no file is found.
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptCatalog::load_template: called");
        for dir in &self.override_dirs {
            let path = dir.join(format!("{name}.pmt"));
            if path.exists() {
                debug!(?path, "PromptCatalog::load_template: found override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
        }

        if self.use_builtin
            && let Some(content) = get_embedded(name)
        {
            debug!(%name, "PromptCatalog::load_template: found in embedded");
            return Ok(content.to_string());
        }

        debug!(%name, "PromptCatalog::load_template: not found anywhere");
        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given variables
    pub fn render(&self, template_id: &str, variables: &HashMap<String, String>) -> Result<String> {
        debug!(%template_id, variable_count = variables.len(), "PromptCatalog::render: called");
        let template = self.load_template(template_id)?;

        self.hbs
            .render_template(&template, variables)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_id, e))
    }
}
