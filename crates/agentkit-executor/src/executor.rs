use std::sync::Arc;

use agentkit_expression::interpolate_map;
use agentkit_node::HandlerRegistry;
use agentkit_store::{Json, NodeRun, NodeRunStatus, RunStatus, Store, TriggerKind, WorkflowRun};
use agentkit_workflow::{Workflow, WorkflowNode};
use chrono::Utc;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{error, info};

/// Errors escaping the executor itself.
///
/// Handler failures never surface here; they are recorded on the run. Only
/// a failure of the executor's own bookkeeping (the final run flush)
/// propagates to the caller.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error("run bookkeeping failed: {0}")]
  Store(#[from] agentkit_store::Error),
}

/// Executes workflows against the handler registry, recording runs and
/// node runs through the store.
pub struct WorkflowExecutor {
  store: Arc<dyn Store>,
  registry: Arc<HandlerRegistry>,
}

impl WorkflowExecutor {
  pub fn new(store: Arc<dyn Store>, registry: Arc<HandlerRegistry>) -> Self {
    Self { store, registry }
  }

  /// Execute a workflow with the given input payload.
  ///
  /// Returns the finalized run record, node runs included. The run row is
  /// created `running` before the first node and flushed after each node so
  /// concurrent readers observe progress.
  pub async fn execute(
    &self,
    workflow: &Workflow,
    input_payload: Value,
    trigger_kind: TriggerKind,
  ) -> Result<WorkflowRun, ExecuteError> {
    let mut run = WorkflowRun::started(&workflow.id, trigger_kind, input_payload.clone());
    self.store.create_run(&run).await?;

    info!(
      run_id = %run.id,
      workflow_id = %workflow.id,
      trigger = trigger_kind.as_str(),
      "workflow_started"
    );

    let mut context = initial_context(workflow, input_payload, trigger_kind);

    if let Err(e) = self.run_nodes(workflow, &mut run, &mut context).await {
      // Bookkeeping failed mid-run; record what we know and finalize.
      run.status = RunStatus::Failed;
      run.error = Some(format!("execution aborted: {}", e));
    }

    run.completed_at = Some(Utc::now());
    self.store.update_run(&run).await?;

    match run.status {
      RunStatus::Completed => info!(run_id = %run.id, "workflow_completed"),
      _ => error!(
        run_id = %run.id,
        error = run.error.as_deref().unwrap_or(""),
        "workflow_failed"
      ),
    }

    Ok(run)
  }

  async fn run_nodes(
    &self,
    workflow: &Workflow,
    run: &mut WorkflowRun,
    context: &mut Map<String, Value>,
  ) -> Result<(), ExecuteError> {
    let order = match workflow.graph().topological_order() {
      Ok(order) => order,
      Err(e) => {
        run.status = RunStatus::Failed;
        run.error = Some(e.to_string());
        return Ok(());
      }
    };

    for node_key in order {
      let Some(node) = workflow.node_by_key(&node_key) else {
        continue;
      };

      let node_run = self.execute_node(run, node, context).await?;
      let failed = node_run.status == NodeRunStatus::Failed;
      let node_error = node_run.error.clone();
      run.node_runs.push(node_run);

      if failed {
        run.status = RunStatus::Failed;
        run.error = Some(format!(
          "Node {} failed: {}",
          node_key,
          node_error.unwrap_or_default()
        ));
        return Ok(());
      }
    }

    run.status = RunStatus::Completed;
    run.output_payload = Json(context.get("_last_output").cloned().unwrap_or_else(|| json!({})));
    Ok(())
  }

  async fn execute_node(
    &self,
    run: &WorkflowRun,
    node: &WorkflowNode,
    context: &mut Map<String, Value>,
  ) -> Result<NodeRun, ExecuteError> {
    let mut node_run = NodeRun::started(&run.id, &node.id);
    self.store.create_node_run(&node_run).await?;

    let node_key = node.key().to_string();
    node_run.node_key = Some(node_key.clone());

    info!(
      run_id = %run.id,
      node_key = %node_key,
      node_type = %node.node_type,
      "node_started"
    );

    let resolved = interpolate_map(&node.data, context);
    node_run.input_data = Json(Value::Object(resolved.clone()));

    let result = match self.registry.handler_for(&node.node_type) {
      Ok(handler) => handler.execute(&resolved, context, self.store.as_ref()).await,
      Err(e) => Err(e),
    };

    match result {
      Ok(outcome) => {
        let output = Value::Object(outcome.output);
        context.insert(node_key.clone(), json!({ "output": output.clone() }));
        context.insert("_last_output".to_string(), output.clone());

        node_run.output_data = Json(output);
        node_run.token_usage = outcome
          .token_usage
          .and_then(|usage| serde_json::to_value(usage).ok())
          .map(Json);
        node_run.status = NodeRunStatus::Completed;

        info!(run_id = %run.id, node_key = %node_key, "node_completed");
      }
      Err(e) => {
        node_run.status = NodeRunStatus::Failed;
        node_run.error = Some(e.to_string());

        error!(run_id = %run.id, node_key = %node_key, error = %e, "node_failed");
      }
    }

    let completed_at = Utc::now();
    node_run.execution_time_ms = (completed_at - node_run.started_at)
      .num_microseconds()
      .unwrap_or_default() as f64
      / 1000.0;
    node_run.completed_at = Some(completed_at);
    self.store.update_node_run(&node_run).await?;

    Ok(node_run)
  }
}

/// The context every run starts from: the trigger payload, the workflow's
/// variables and id, and an (empty) environment section.
fn initial_context(
  workflow: &Workflow,
  input_payload: Value,
  trigger_kind: TriggerKind,
) -> Map<String, Value> {
  let Value::Object(context) = json!({
    "trigger": { "body": input_payload, "type": trigger_kind.as_str() },
    "workflow": { "variables": workflow.variables, "id": workflow.id },
    "env": {},
  }) else {
    unreachable!()
  };
  context
}
