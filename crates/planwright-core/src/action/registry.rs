//! Action registry: name/alias resolution over registered actions.

use std::sync::Arc;

use super::{Action, BoxAction};

/// Registered actions, resolvable by name or alias.
///
/// Resolution order for a requested name:
/// 1. exact canonical name
/// 2. canonical name ignoring case and underscores
/// 3. any declared alias (exact, then ignoring case and underscores)
#[derive(Debug, Default, Clone)]
pub struct ActionRegistry {
    actions: Vec<Arc<BoxAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action. Later registrations never shadow earlier exact names.
    pub fn register<A: Action + 'static>(&mut self, action: A) -> &mut Self {
        self.actions.push(Arc::new(BoxAction::new(action)));
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<A: Action + 'static>(mut self, action: A) -> Self {
        self.register(action);
        self
    }

    /// Resolve an action by name, normalized name, or alias.
    pub fn resolve(&self, name: &str) -> Option<Arc<BoxAction>> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        if let Some(action) = self.actions.iter().find(|a| a.name() == name) {
            return Some(Arc::clone(action));
        }

        let wanted = normalize(name);
        if let Some(action) = self.actions.iter().find(|a| normalize(a.name()) == wanted) {
            return Some(Arc::clone(action));
        }

        self.actions
            .iter()
            .find(|a| a.aliases().iter().any(|alias| alias == name))
            .or_else(|| {
                self.actions
                    .iter()
                    .find(|a| a.aliases().iter().any(|alias| normalize(alias) == wanted))
            })
            .map(Arc::clone)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Canonical names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.name().to_string()).collect()
    }

    /// `(name, description)` pairs for prompt construction.
    pub fn catalog(&self) -> Vec<(String, String)> {
        self.actions
            .iter()
            .map(|a| (a.name().to_string(), a.description().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Lowercase and strip underscores: `send_Email` and `SENDEMAIL` match `SEND_EMAIL`.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}
