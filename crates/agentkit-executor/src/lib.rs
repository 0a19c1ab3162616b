//! Workflow execution engine.
//!
//! The [`WorkflowExecutor`] runs one workflow at a time: it orders the
//! graph topologically, executes nodes sequentially, threads each handler's
//! output back into the run context, and records a run plus one node-run
//! row per executed node. Concurrency lives strictly between runs: any
//! number of `execute` calls may be in flight, each owning its context.
//!
//! Failure policy: the first failing node stops the run. Its error is
//! recorded on both the node run and the run; later nodes in the order are
//! never started and get no node-run row. A graph that cannot be ordered
//! (cycle, edge to a missing node) fails the run before any node executes.

mod executor;

pub use executor::{ExecuteError, WorkflowExecutor};
