//! BoxPlanningModel -- object-safe dynamic dispatch wrapper for `PlanningModel`.
//!
//! Same blanket-impl pattern as `BoxAction`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use super::model::{ModelError, PlanningModel, PlanningRequest};

/// Object-safe version of [`PlanningModel`] with a boxed future.
pub trait PlanningModelDyn: Send + Sync {
    fn name(&self) -> &str;

    fn complete_boxed<'a>(
        &'a self,
        request: &'a PlanningRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + 'a>>;
}

impl<T: PlanningModel> PlanningModelDyn for T {
    fn name(&self) -> &str {
        PlanningModel::name(self)
    }

    fn complete_boxed<'a>(
        &'a self,
        request: &'a PlanningRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + 'a>> {
        Box::pin(self.complete(request))
    }
}

/// Type-erased planning model for runtime backend selection.
pub struct BoxPlanningModel {
    inner: Box<dyn PlanningModelDyn>,
}

impl BoxPlanningModel {
    pub fn new<T: PlanningModel + 'static>(model: T) -> Self {
        Self {
            inner: Box::new(model),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn complete(&self, request: &PlanningRequest) -> Result<String, ModelError> {
        self.inner.complete_boxed(request).await
    }
}

impl fmt::Debug for BoxPlanningModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxPlanningModel")
            .field("name", &self.name())
            .finish()
    }
}
