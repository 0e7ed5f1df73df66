//! Driver resolution: which upstream interface/driver/method serves a model.
//!
//! Rules are model-id prefixes checked in order; the first hit wins and a
//! miss falls back to a catch-all driver.

use toolrelay_config::{DriverRule, UpstreamConfig};
use toolrelay_core::DriverRoute;

/// Ordered prefix table from model id to upstream driver.
#[derive(Debug, Clone)]
pub struct DriverTable {
    interface: String,
    method: String,
    fallback_driver: String,
    rules: Vec<DriverRule>,
}

impl DriverTable {
    pub fn new(
        interface: impl Into<String>,
        method: impl Into<String>,
        fallback_driver: impl Into<String>,
        rules: Vec<DriverRule>,
    ) -> Self {
        Self {
            interface: interface.into(),
            method: method.into(),
            fallback_driver: fallback_driver.into(),
            rules,
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(
            &config.interface,
            &config.method,
            &config.fallback_driver,
            config.drivers.clone(),
        )
    }

    /// Resolve the call shape for `model`.
    pub fn resolve(&self, model: &str) -> DriverRoute {
        let driver = self
            .rules
            .iter()
            .find(|rule| model.starts_with(&rule.prefix))
            .map_or(self.fallback_driver.as_str(), |rule| rule.driver.as_str());

        DriverRoute {
            interface: self.interface.clone(),
            driver: driver.to_string(),
            method: self.method.clone(),
        }
    }
}

impl Default for DriverTable {
    fn default() -> Self {
        Self::from_config(&UpstreamConfig::default())
    }
}

/// Owner label shown for a model id in model listings.
pub fn owned_by(model: &str) -> &'static str {
    const OWNERS: &[(&[&str], &str)] = &[
        (&["openrouter:"], "openrouter"),
        (&["togetherai:"], "togetherai"),
        (&["claude-"], "anthropic"),
        (&["gpt-", "o1", "o3", "o4"], "openai"),
        (&["gemini-"], "google"),
        (&["grok-"], "xai"),
        (&["deepseek-"], "deepseek"),
        (
            &[
                "mistral-",
                "ministral-",
                "open-mistral-",
                "pixtral-",
                "codestral-",
                "devstral-",
                "magistral-",
            ],
            "mistral",
        ),
    ];

    OWNERS
        .iter()
        .find(|(prefixes, _)| prefixes.iter().any(|p| model.starts_with(p)))
        .map_or("other", |&(_, owner)| owner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_models_use_claude_driver() {
        let route = DriverTable::default().resolve("claude-opus-4-5");
        assert_eq!(route.driver, "claude");
        assert_eq!(route.interface, "puter-chat-completion");
        assert_eq!(route.method, "complete");
    }

    #[test]
    fn openai_families_share_a_driver() {
        let table = DriverTable::default();
        for model in ["gpt-4o", "o1-mini", "o3", "o4-mini"] {
            assert_eq!(table.resolve(model).driver, "openai-completion", "{model}");
        }
    }

    #[test]
    fn unknown_model_falls_back() {
        assert_eq!(DriverTable::default().resolve("llama-3-70b").driver, "openrouter");
    }

    #[test]
    fn first_matching_rule_wins() {
        let table = DriverTable::new(
            "iface",
            "complete",
            "fallback",
            vec![DriverRule::new("gpt-4", "special"), DriverRule::new("gpt-", "generic")],
        );
        assert_eq!(table.resolve("gpt-4o").driver, "special");
        assert_eq!(table.resolve("gpt-3.5-turbo").driver, "generic");
    }

    #[test]
    fn owners_for_known_prefixes() {
        assert_eq!(owned_by("claude-sonnet-4-5"), "anthropic");
        assert_eq!(owned_by("o3-pro"), "openai");
        assert_eq!(owned_by("gemini-2.5-pro"), "google");
        assert_eq!(owned_by("codestral-latest"), "mistral");
        assert_eq!(owned_by("openrouter:meta-llama/llama-3"), "openrouter");
        assert_eq!(owned_by("qwen-max"), "other");
    }
}
