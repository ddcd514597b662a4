//! Fake command runner
//!
//! Answers commands from a rule list (program plus optional substring of the
//! argument vector) and records every command it sees. Unmatched commands
//! succeed with empty output.

use async_trait::async_trait;
use migra_gateway::{CommandRunner, CommandSpec, GatewayError, ProcessOutput};
use parking_lot::Mutex;

#[derive(Debug, Clone)]
enum Response {
    Output(ProcessOutput),
    SpawnFailure,
}

#[derive(Debug, Clone)]
struct Rule {
    program: String,
    needle: Option<String>,
    response: Response,
}

#[derive(Debug, Default)]
pub struct FakeRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<CommandSpec>>,
}

/// Successful process output
pub fn ok(stdout: &str) -> ProcessOutput {
    ProcessOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        returncode: 0,
    }
}

/// Failed process output
pub fn failed(returncode: i32, stderr: &str) -> ProcessOutput {
    ProcessOutput {
        stdout: String::new(),
        stderr: stderr.to_string(),
        returncode,
    }
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every `program` invocation with `output`
    pub fn on(self, program: &str, output: ProcessOutput) -> Self {
        self.push(program, None, Response::Output(output))
    }

    /// Answer `program` invocations mentioning `needle` with `output`
    pub fn on_matching(self, program: &str, needle: &str, output: ProcessOutput) -> Self {
        self.push(program, Some(needle), Response::Output(output))
    }

    /// Make `program` fail to start
    pub fn missing(self, program: &str) -> Self {
        self.push(program, None, Response::SpawnFailure)
    }

    fn push(mut self, program: &str, needle: Option<&str>, response: Response) -> Self {
        // Later rules take precedence so fixtures can be overridden.
        self.rules.insert(
            0,
            Rule {
                program: program.to_string(),
                needle: needle.map(str::to_string),
                response,
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.program.clone()).collect()
    }

    /// Calls whose program is `program` and whose arguments mention `needle`
    pub fn count(&self, program: &str, needle: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.program == program && c.mentions(needle))
            .count()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, GatewayError> {
        self.calls.lock().push(command.clone());
        let rule = self.rules.iter().find(|rule| {
            rule.program == command.program
                && rule.needle.as_deref().map_or(true, |needle| command.mentions(needle))
        });
        match rule.map(|r| &r.response) {
            Some(Response::Output(output)) => Ok(output.clone()),
            Some(Response::SpawnFailure) => Err(GatewayError::Spawn {
                program: command.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            }),
            None => Ok(ok("")),
        }
    }
}
