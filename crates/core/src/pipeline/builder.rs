//! Explicit, statically composed pipeline construction

use std::fmt;
use std::sync::Arc;

use super::stage::Stage;
use super::Pipeline;

/// Collects stages into a [`Pipeline`]
///
/// Two registration styles are supported and may be mixed:
/// - [`stage`](Self::stage) appends inside the stages registered so far,
///   so entry order equals registration order.
/// - [`decorate`](Self::decorate) wraps everything registered so far, so
///   the last decorator runs first and cleans up last.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.stages.iter().map(|stage| stage.name()).collect();
        f.debug_struct("PipelineBuilder").field("stages", &names).finish()
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `stage` innermost
    #[must_use]
    pub fn stage<S: Stage + 'static>(self, stage: S) -> Self {
        self.stage_arc(Arc::new(stage))
    }

    #[must_use]
    pub fn stage_arc(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Wrap the pipeline built so far with `stage`
    #[must_use]
    pub fn decorate<S: Stage + 'static>(self, stage: S) -> Self {
        self.decorate_arc(Arc::new(stage))
    }

    #[must_use]
    pub fn decorate_arc(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.insert(0, stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn build(self) -> Pipeline {
        Pipeline::from_stages(self.stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ContextStage, CultureStage, LoggingScopeStage, TimingStage};

    #[test]
    fn test_stage_appends_inside() {
        let pipeline = PipelineBuilder::new()
            .stage(CultureStage::default())
            .stage(LoggingScopeStage::default())
            .stage(ContextStage::default())
            .build();
        assert_eq!(pipeline.stage_names(), vec!["culture", "logging_scope", "context"]);
    }

    #[test]
    fn test_decorate_wraps_outside() {
        let builder = PipelineBuilder::new()
            .stage(ContextStage::default())
            .decorate(LoggingScopeStage::default())
            .decorate(TimingStage::new("orders"));
        assert_eq!(builder.len(), 3);
        assert_eq!(builder.build().stage_names(), vec!["timing", "logging_scope", "context"]);
    }
}
