// flow_engine/src/pipeline/runner.rs

use crate::core::assembly::FlowConfig;
use crate::core::context::Context;
use crate::core::control::FlowStatus;
use crate::core::descriptor::ErrorDescriptor;
use crate::error::FlowResult;
use crate::pipeline::definition::{Flow, FlowOptions};
use serde_json::Value;
use std::sync::Arc;

/// A parsed configuration plus options, ready to run once per request.
#[derive(Clone, Debug)]
pub struct FlowRunner {
  config: Arc<FlowConfig>,
  options: FlowOptions,
}

impl FlowRunner {
  pub fn new(config: FlowConfig, options: FlowOptions) -> Self {
    Self {
      config: Arc::new(config),
      options,
    }
  }

  pub fn from_value(config: Value, options: FlowOptions) -> FlowResult<Self> {
    Ok(Self::new(FlowConfig::from_value(config)?, options))
  }

  pub fn config(&self) -> &FlowConfig {
    &self.config
  }

  /// A fresh flow over `context`, for callers that subscribe before running.
  pub fn flow(&self, context: Context) -> Flow {
    Flow::from_shared(Arc::clone(&self.config), context, self.options.clone())
  }

  pub async fn run(&self, context: Context) -> Result<FlowStatus, ErrorDescriptor> {
    self.flow(context).run().await
  }
}
