/// Program wrapping and report decoding
///
/// Every backend runs the same JavaScript wrapper. The wrapper binds `input`,
/// evaluates the candidate code followed by the case input (or a generated
/// call) inside a try/catch, and writes a single report line tagged with a per-context marker
/// so that anything the candidate prints cannot be confused with the verdict.

use crate::engine::Evaluation;
use crate::error::HarnessError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

lazy_static! {
    static ref ENTRY_POINT: Regex =
        Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)*$")
            .expect("Invalid entry point pattern");
}

/// A fully bound program for one test case
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Candidate source
    pub code: String,
    /// Text bound to the `input` variable
    pub input: String,
    /// Expression evaluated after the candidate code; its value is the answer.
    /// `None` evaluates `input` itself as a program and takes its completion
    /// value.
    pub terminal: Option<String>,
}

impl Program {
    /// Input is JavaScript source, evaluated after the candidate code
    pub fn expression(code: &str, input: &str) -> Self {
        Self {
            code: code.to_string(),
            input: input.to_string(),
            terminal: None,
        }
    }

    /// Input is JSON data handed to `entry_point` as arguments.
    ///
    /// A JSON array is spread as the argument list, any other value becomes
    /// the single argument. The data travels as a string literal through
    /// `JSON.parse`, so it is never evaluated as source.
    pub fn call(code: &str, entry_point: &EntryPoint, input: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(input)?;
        let args = match value {
            serde_json::Value::Array(items) => serde_json::Value::Array(items),
            other => serde_json::Value::Array(vec![other]),
        };
        let args_literal = js_string(&args.to_string());

        Ok(Self {
            code: code.to_string(),
            input: input.to_string(),
            terminal: Some(format!("{}(...JSON.parse({}))", entry_point.as_str(), args_literal)),
        })
    }
}

/// Validated function name (optionally dotted) used in argument mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint(String);

impl EntryPoint {
    pub fn parse(name: &str) -> Option<Self> {
        ENTRY_POINT.is_match(name).then(|| EntryPoint(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Encode text as a JavaScript string literal
fn js_string(text: &str) -> String {
    // JSON string syntax is a subset of JavaScript string literal syntax
    serde_json::Value::String(text.to_string()).to_string()
}

/// Render the wrapper script for a program
pub fn render(program: &Program, marker: &str) -> String {
    // A nested direct eval keeps statement syntax, trailing semicolons and
    // labelled blocks in the input meaningful
    let body = match program.terminal.as_deref() {
        None => format!("{}\n;eval(input)", program.code),
        Some(terminal) if terminal.trim().is_empty() => format!("{}\n;(\nundefined\n)", program.code),
        Some(terminal) => format!("{}\n;(\n{}\n)", program.code, terminal),
    };

    format!(
        r#"const __codetestStringify = JSON.stringify;
const __codetestWrite = require("fs").writeSync;
const __codetestExit = process.exit.bind(process);
const __codetestDescribe = function (error) {{
  try {{
    return String(error);
  }} catch (_) {{
    return "Unknown error";
  }}
}};
const input = {input};
const __codetestOutcome = (function () {{
  try {{
    const __codetestResult = __codetestStringify(eval({body}));
    return {{ success: true, result: __codetestResult === undefined ? null : __codetestResult }};
  }} catch (error) {{
    return {{ success: false, error: __codetestDescribe(error) }};
  }}
}})();
__codetestWrite(1, "\n" + {marker} + __codetestStringify(__codetestOutcome) + "\n");
__codetestExit(0);
"#,
        input = js_string(&program.input),
        body = js_string(&body),
        marker = js_string(marker),
    )
}

/// The line the wrapper writes once the program settles
#[derive(Debug, Deserialize)]
struct Report {
    success: bool,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Turn raw interpreter output into an evaluation
///
/// The last marker occurrence wins. No marker means the interpreter died
/// before the wrapper could report (syntax-level crash, `process.exit`,
/// heap exhaustion) and is attributed to the candidate.
pub fn interpret(
    stdout: &str,
    stderr: &str,
    exit_code: Option<i64>,
    marker: &str,
) -> Result<Evaluation, HarnessError> {
    let Some(position) = stdout.rfind(marker) else {
        return Ok(Evaluation::Aborted(describe_exit(stderr, exit_code)));
    };

    let line = stdout[position + marker.len()..]
        .lines()
        .next()
        .unwrap_or_default();
    let report: Report = serde_json::from_str(line)
        .map_err(|e| HarnessError::Protocol(format!("{} in {:?}", e, line)))?;

    if report.success {
        Ok(Evaluation::Returned(report.result))
    } else {
        Ok(Evaluation::Threw(report.error.unwrap_or_default()))
    }
}

fn describe_exit(stderr: &str, exit_code: Option<i64>) -> String {
    if exit_code == Some(137) {
        return "Program was killed: likely exceeded memory limit".to_string();
    }

    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let headline = lines
        .iter()
        .find(|line| line.contains("FATAL ERROR"))
        .or_else(|| lines.iter().find(|line| is_error_headline(line)))
        .or_else(|| lines.last());

    match (headline, exit_code) {
        (Some(line), _) => line.to_string(),
        (None, Some(code)) => format!("Program exited with code {} before producing a result", code),
        (None, None) => "Program terminated before producing a result".to_string(),
    }
}

fn is_error_headline(line: &str) -> bool {
    match line.split_once(':') {
        Some((name, _)) => name.ends_with("Error") && !name.contains(' '),
        None => false,
    }
}
