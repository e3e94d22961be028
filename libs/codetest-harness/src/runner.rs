// Case runner: one test case, one fresh execution context, one TestResult
// Nothing that happens here may escape as an error or panic

use crate::engine::{ContextProvider, Evaluation};
use crate::error::HarnessError;
use crate::evaluator;
use crate::script::{EntryPoint, Program};
use codetest_common::config::{MAX_SOURCE_CODE_BYTES, MAX_TEST_INPUT_BYTES};
use codetest_common::types::{TestCase, TestResult};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, warn};

pub const HARNESS_ERROR_PREFIX: &str = "Harness error: ";

/// How inputs are bound for a request
#[derive(Debug, Clone)]
pub enum InputMode {
    /// Input is expression source evaluated after the candidate code
    Expression,
    /// Input is JSON arguments for the named function
    Call(EntryPoint),
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub timeout: Duration,
    pub mode: InputMode,
}

pub struct TestRunner<'a> {
    provider: &'a dyn ContextProvider,
    options: RunOptions,
}

impl<'a> TestRunner<'a> {
    pub fn new(provider: &'a dyn ContextProvider, options: RunOptions) -> Self {
        Self { provider, options }
    }

    /// Evaluate one case. Always yields a result.
    pub async fn run(&self, code: &str, test_case: &TestCase) -> TestResult {
        if code.len() > MAX_SOURCE_CODE_BYTES {
            return TestResult::failed(
                test_case,
                format!("Source code exceeds maximum size of {} bytes", MAX_SOURCE_CODE_BYTES),
            );
        }
        if test_case.input.len() > MAX_TEST_INPUT_BYTES {
            return TestResult::failed(
                test_case,
                format!("Test input exceeds maximum size of {} bytes", MAX_TEST_INPUT_BYTES),
            );
        }

        let program = match &self.options.mode {
            InputMode::Expression => Program::expression(code, &test_case.input),
            InputMode::Call(entry_point) => match Program::call(code, entry_point, &test_case.input) {
                Ok(program) => program,
                Err(e) => return TestResult::failed(test_case, format!("Invalid test input: {}", e)),
            },
        };

        let outcome = AssertUnwindSafe(self.execute(&program))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HarnessError::Panic(panic_message(panic.as_ref()))));

        match outcome {
            Ok(evaluation) => self.to_result(test_case, evaluation),
            Err(e) => {
                warn!(error = %e, input = %test_case.input, "Harness fault while running test case");
                TestResult::failed(test_case, format!("{}{}", HARNESS_ERROR_PREFIX, e))
            }
        }
    }

    async fn execute(&self, program: &Program) -> Result<Evaluation, HarnessError> {
        let mut context = self.provider.create_context().await?;
        let evaluation = context.execute(program, self.options.timeout).await;
        drop(context);
        evaluation
    }

    fn to_result(&self, test_case: &TestCase, evaluation: Evaluation) -> TestResult {
        match evaluation {
            Evaluation::Returned(produced) => {
                let result = evaluator::evaluate_output(test_case, produced.as_deref());
                debug!(passed = result.passed, actual = %result.actual, "Test case evaluated");
                result
            }
            Evaluation::Threw(message) => {
                debug!(error = %message, "Candidate code raised");
                let message = if message.is_empty() {
                    "Unknown error".to_string()
                } else {
                    message
                };
                TestResult::failed(test_case, message)
            }
            Evaluation::TimedOut(timeout_ms) => {
                TestResult::failed(test_case, format!("Execution timed out after {}ms", timeout_ms))
            }
            Evaluation::Aborted(message) => TestResult::failed(test_case, message),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use crate::engine::{ContextProvider, Evaluation, ExecutionContext};
    use crate::error::HarnessError;
    use crate::script::Program;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// What the scripted interpreter does for a given input or terminal expression
    #[derive(Clone)]
    pub enum Scripted {
        Eval(Evaluation),
        Fail(&'static str),
        Panic,
    }

    /// Provider answering from a table keyed by terminal expression, or by the
    /// raw input when the program evaluates it directly
    #[derive(Default)]
    pub struct ScriptedProvider {
        pub answers: HashMap<String, Scripted>,
        pub refuse_contexts: bool,
        pub contexts_created: AtomicUsize,
        pub seen: Arc<Mutex<Vec<Program>>>,
    }

    impl ScriptedProvider {
        pub fn with(mut self, terminal: &str, answer: Scripted) -> Self {
            self.answers.insert(terminal.to_string(), answer);
            self
        }
    }

    struct ScriptedContext {
        answers: HashMap<String, Scripted>,
        seen: Arc<Mutex<Vec<Program>>>,
    }

    #[async_trait]
    impl ContextProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn create_context(&self) -> Result<Box<dyn ExecutionContext>, HarnessError> {
            if self.refuse_contexts {
                return Err(HarnessError::ContextCreation("interpreter unavailable".to_string()));
            }
            self.contexts_created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedContext {
                answers: self.answers.clone(),
                seen: self.seen.clone(),
            }))
        }

        async fn probe(&self) -> Result<String, HarnessError> {
            Ok("scripted".to_string())
        }
    }

    #[async_trait]
    impl ExecutionContext for ScriptedContext {
        async fn execute(&mut self, program: &Program, _timeout: Duration) -> Result<Evaluation, HarnessError> {
            self.seen.lock().unwrap().push(program.clone());
            let source = program.terminal.as_deref().unwrap_or(&program.input);
            match self.answers.get(source) {
                Some(Scripted::Eval(evaluation)) => Ok(evaluation.clone()),
                Some(Scripted::Fail(message)) => Err(HarnessError::Protocol(message.to_string())),
                Some(Scripted::Panic) => panic!("scripted panic"),
                None => Ok(Evaluation::Threw(format!("ReferenceError: {} is not defined", source))),
            }
        }
    }
}
