use std::sync::Arc;

use regex::Regex;

use crate::config::{LabelConfig, TokenByMatch};

use super::Error;

/// Converts a configured token into a routable one; empty means none.
pub(super) fn token(raw: Option<&str>) -> Option<Arc<str>> {
    raw.filter(|token| !token.is_empty()).map(Arc::from)
}

/// Image name rules, first match wins.
#[derive(Debug, Default)]
pub struct TokenRules {
    rules: Vec<(Regex, Option<Arc<str>>)>,
}

impl TokenRules {
    pub fn compile(rules: &[TokenByMatch]) -> Result<Self, Error> {
        let rules = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|pattern| (pattern, token(Some(rule.token.as_str()))))
                    .map_err(|source| Error::TokenPattern {
                        pattern: rule.pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    /// Returns the outcome of the first rule matching `image`.
    ///
    /// `None` means no rule matched, `Some(None)` that the matching rule has no
    /// token.
    pub fn resolve(&self, image: &str) -> Option<Option<Arc<str>>> {
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.is_match(image))
            .map(|(_, token)| token.clone())
    }
}

/// Derives display labels from container names.
#[derive(Debug)]
pub struct LabelRule {
    pattern: Regex,
    template: String,
}

impl LabelRule {
    pub fn compile(config: &LabelConfig) -> Result<Self, Error> {
        let pattern = Regex::new(&config.pattern).map_err(|source| Error::LabelPattern {
            pattern: config.pattern.clone(),
            source,
        })?;
        Ok(Self {
            pattern,
            template: config.template.clone(),
        })
    }

    /// Expands the template with the captures of `name`, or returns `None`
    /// when the pattern does not match.
    pub fn render(&self, name: &str) -> Option<String> {
        let captures = self.pattern.captures(name)?;
        let mut label = String::with_capacity(self.template.len() + name.len());
        captures.expand(&self.template, &mut label);
        Some(label)
    }
}
