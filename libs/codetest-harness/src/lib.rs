//! Execution-and-comparison harness for submitted JavaScript.
//!
//! [`Harness::evaluate`] runs every test case of a [`CodeTestRequest`] in a
//! fresh execution context and reports a [`CodeTestResponse`]; it never fails.
//!
//! [`CodeTestRequest`]: codetest_common::types::CodeTestRequest
//! [`CodeTestResponse`]: codetest_common::types::CodeTestResponse

pub mod docker;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod runner;
pub mod script;


pub use engine::{build_provider, ContextProvider, Evaluation, ExecutionContext, NodeEngine};
pub use error::HarnessError;
pub use executor::Harness;
