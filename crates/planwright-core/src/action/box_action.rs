//! BoxAction -- object-safe dynamic dispatch wrapper for `Action`.
//!
//! 1. Define an object-safe `ActionDyn` trait with a boxed future
//! 2. Blanket-impl `ActionDyn` for all `T: Action`
//! 3. `BoxAction` wraps `Box<dyn ActionDyn>` and delegates

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use super::{Action, ActionContext, ActionError, ActionOutput};

/// Object-safe version of [`Action`] with a boxed future.
pub trait ActionDyn: Send + Sync {
    fn name(&self) -> &str;

    fn aliases(&self) -> &[String];

    fn description(&self) -> &str;

    fn invoke_boxed(
        &self,
        ctx: ActionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ActionOutput, ActionError>> + Send + '_>>;
}

impl<T: Action> ActionDyn for T {
    fn name(&self) -> &str {
        Action::name(self)
    }

    fn aliases(&self) -> &[String] {
        Action::aliases(self)
    }

    fn description(&self) -> &str {
        Action::description(self)
    }

    fn invoke_boxed(
        &self,
        ctx: ActionContext,
    ) -> Pin<Box<dyn Future<Output = Result<ActionOutput, ActionError>> + Send + '_>> {
        Box::pin(self.invoke(ctx))
    }
}

/// Type-erased action for storage in an [`ActionRegistry`](super::ActionRegistry).
pub struct BoxAction {
    inner: Box<dyn ActionDyn>,
}

impl BoxAction {
    pub fn new<T: Action + 'static>(action: T) -> Self {
        Self {
            inner: Box::new(action),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn aliases(&self) -> &[String] {
        self.inner.aliases()
    }

    pub fn description(&self) -> &str {
        self.inner.description()
    }

    pub async fn invoke(&self, ctx: ActionContext) -> Result<ActionOutput, ActionError> {
        self.inner.invoke_boxed(ctx).await
    }
}

impl fmt::Debug for BoxAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxAction")
            .field("name", &self.name())
            .field("aliases", &self.aliases())
            .finish()
    }
}
