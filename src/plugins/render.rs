//! Read-only views over active guidance.

use crate::core::model::GuidanceRule;
use crate::plugins::ingest::ComponentAttribution;

pub struct GuidanceRenderer {
    engine_tag: String,
}

impl GuidanceRenderer {
    pub fn new(engine_tag: &str) -> Self {
        Self {
            engine_tag: engine_tag.to_string(),
        }
    }

    /// One warning per rule whose component changed, in `guidance` order.
    pub fn build_warnings<S: AsRef<str>>(
        &self,
        changed_components: &[S],
        guidance: &[GuidanceRule],
    ) -> Vec<String> {
        guidance
            .iter()
            .filter(|rule| {
                changed_components
                    .iter()
                    .any(|c| c.as_ref() == rule.component)
            })
            .map(|rule| self.warning_line(rule))
            .collect()
    }

    pub fn warning_line(&self, rule: &GuidanceRule) -> String {
        format!("[{}] {}: {}", self.engine_tag, rule.component, rule.description)
    }

    /// Markdown section, one bullet per rule.
    pub fn render_section(&self, title: &str, guidance: &[GuidanceRule]) -> String {
        let mut out = format!("## {title}\n\n");
        if guidance.is_empty() {
            out.push_str("_No active guidance._\n");
            return out;
        }
        for rule in guidance {
            out.push_str(&format!(
                "- **{}**: {} (support: {} PRs, lift: {:.2})\n",
                rule.component, rule.description, rule.support_prs, rule.lift
            ));
        }
        out
    }
}

/// Components touched by a set of changed paths, first-seen order, no
/// duplicates. Paths matching no rule are ignored.
pub fn changed_components_from_paths<S: AsRef<str>>(
    paths: &[S],
    attribution: &ComponentAttribution,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for path in paths {
        if let Some(component) = attribution.component_for_path(path.as_ref()) {
            if !out.iter().any(|c| c == component) {
                out.push(component.to_string());
            }
        }
    }
    out
}
