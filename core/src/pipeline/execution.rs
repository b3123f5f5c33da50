// catalog_core/src/pipeline/execution.rs

//! `Pipeline::run()`: executes the steps in order against one shared context.

use crate::error::CatalogError;
use crate::pipeline::context_data::ContextData;
use crate::pipeline::control::{PipelineControl, PipelineResult};
use crate::pipeline::definition::Pipeline;
use tracing::{event, Instrument, Level};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<CatalogError> + Send + Sync + 'static,
{
  /// Runs every step against `ctx_data`.
  ///
  /// Returns `Stopped` as soon as a handler asks to stop, the first handler
  /// error as-is, and `CatalogError::HandlerMissing` (converted into `Err`)
  /// for a non-optional step nobody registered a handler for.
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    let run_span = tracing::info_span!(
      "pipeline_run",
      pipeline = %self.name,
      num_steps = self.steps.len()
    );

    async {
      event!(Level::DEBUG, "Pipeline execution starting.");

      for (step_idx, step_def) in self.steps.iter().enumerate() {
        let step_name = step_def.name.as_str();
        let handlers = match self.on.get(step_name) {
          Some(handlers) if !handlers.is_empty() => handlers,
          _ if step_def.optional => {
            event!(Level::DEBUG, step = step_name, "Optional step has no handlers, skipping.");
            continue;
          }
          _ => {
            event!(Level::ERROR, step = step_name, "Non-optional step has no handlers.");
            return Err(Err::from(CatalogError::HandlerMissing {
              step_name: step_def.name.clone(),
            }));
          }
        };

        let step_span = tracing::debug_span!("pipeline_step", step_name, step_index = step_idx);
        for handler_fn in handlers {
          match handler_fn(ctx_data.clone()).instrument(step_span.clone()).await {
            Ok(PipelineControl::Continue) => {}
            Ok(PipelineControl::Stop) => {
              event!(Level::INFO, step = step_name, "Pipeline stopped by a handler.");
              return Ok(PipelineResult::Stopped);
            }
            Err(e) => {
              event!(Level::WARN, step = step_name, error = %e, "Step handler failed.");
              return Err(e);
            }
          }
        }
      }

      event!(Level::DEBUG, "Pipeline execution completed.");
      Ok(PipelineResult::Completed)
    }
    .instrument(run_span)
    .await
  }
}
