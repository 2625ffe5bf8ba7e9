//! In-memory connection for exercising proxies without a server
//!
//! Responses are scripted per command text (`[schema].[name]`); every command
//! that reaches the connection is recorded with the parameters it was bound
//! with, before any outputs were written back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sproc_core::{
    Command, CommandState, CommandType, Connection, DataReader, MaterializedReader, Parameter,
    ParameterDirection, Result, ResultSet, SprocError, Value,
};

/// How a command was executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    NonQuery,
    Reader,
}

/// A command as it reached the connection
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedCommand {
    pub text: String,
    pub command_type: CommandType,
    pub timeout: Duration,
    pub parameters: Vec<Parameter>,
    pub kind: ExecutionKind,
    pub asynchronous: bool,
}

impl ExecutedCommand {
    /// Bound parameter named `name`, ignoring ASCII case
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

/// Failure a scripted response raises instead of completing
#[derive(Debug, Clone, PartialEq)]
pub enum MockFailure {
    Driver(String),
    Timeout(String),
}

impl From<&MockFailure> for SprocError {
    fn from(failure: &MockFailure) -> Self {
        match failure {
            MockFailure::Driver(message) => SprocError::Driver(message.clone()),
            MockFailure::Timeout(message) => SprocError::Timeout(message.clone()),
        }
    }
}

/// Scripted outcome of one procedure
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockResponse {
    pub result_sets: Vec<ResultSet>,
    pub outputs: Vec<(String, Value)>,
    pub return_value: Option<i32>,
    pub rows_affected: u64,
    pub failure: Option<MockFailure>,
}

impl MockResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result_set(mut self, set: ResultSet) -> Self {
        self.result_sets.push(set);
        self
    }

    /// Value the server reports for an output parameter
    pub fn with_output(mut self, name: impl Into<String>, value: Value) -> Self {
        self.outputs.push((name.into(), value));
        self
    }

    pub fn with_return_value(mut self, value: i32) -> Self {
        self.return_value = Some(value);
        self
    }

    pub fn with_rows_affected(mut self, rows: u64) -> Self {
        self.rows_affected = rows;
        self
    }

    pub fn failing(mut self, failure: MockFailure) -> Self {
        self.failure = Some(failure);
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<String, MockResponse>,
    executed: Vec<ExecutedCommand>,
    commands_created: usize,
    closed: bool,
}

/// A [`Connection`] answering from scripted responses
#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// This connection as the handle proxies take
    pub fn shared(&self) -> Arc<dyn Connection> {
        Arc::new(self.clone())
    }

    /// Script the response for `command_text`, replacing any previous one
    pub fn respond(&self, command_text: &str, response: MockResponse) {
        self.state
            .lock()
            .responses
            .insert(command_text.to_string(), response);
    }

    /// Commands executed so far, oldest first
    pub fn executed(&self) -> Vec<ExecutedCommand> {
        self.state.lock().executed.clone()
    }

    /// The most recently executed command
    pub fn last_executed(&self) -> Option<ExecutedCommand> {
        self.state.lock().executed.last().cloned()
    }

    /// Number of commands created, executed or not
    pub fn commands_created(&self) -> usize {
        self.state.lock().commands_created
    }

    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    fn run(
        &self,
        command: &mut CommandState,
        kind: ExecutionKind,
        asynchronous: bool,
    ) -> Result<MockResponse> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SprocError::Connection("connection is closed".into()));
        }
        state.executed.push(ExecutedCommand {
            text: command.text.clone(),
            command_type: command.command_type,
            timeout: command.timeout,
            parameters: command.parameters.clone(),
            kind,
            asynchronous,
        });
        let response = state
            .responses
            .get(&command.text)
            .cloned()
            .unwrap_or_default();
        drop(state);

        if let Some(failure) = &response.failure {
            return Err(failure.into());
        }

        for (name, value) in &response.outputs {
            command.set_output(name, value.clone());
        }
        if let Some(code) = response.return_value {
            for parameter in command
                .parameters
                .iter_mut()
                .filter(|p| p.direction == ParameterDirection::ReturnValue)
            {
                parameter.value = Value::Int32(code);
            }
        }
        Ok(response)
    }
}

impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    fn create_command(&self) -> Result<Box<dyn Command + '_>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SprocError::Connection("connection is closed".into()));
        }
        state.commands_created += 1;
        Ok(Box::new(MockCommand {
            connection: self,
            state: CommandState::default(),
        }))
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Command issued on a [`MockConnection`]
pub struct MockCommand<'c> {
    connection: &'c MockConnection,
    state: CommandState,
}

impl MockCommand<'_> {
    fn non_query(&mut self, asynchronous: bool) -> Result<u64> {
        let response = self
            .connection
            .run(&mut self.state, ExecutionKind::NonQuery, asynchronous)?;
        Ok(response.rows_affected)
    }

    fn reader(&mut self, asynchronous: bool) -> Result<Box<dyn DataReader>> {
        let response = self
            .connection
            .run(&mut self.state, ExecutionKind::Reader, asynchronous)?;
        Ok(Box::new(MaterializedReader::new(response.result_sets)))
    }
}

#[async_trait]
impl Command for MockCommand<'_> {
    fn set_command_text(&mut self, text: &str) {
        self.state.text = text.to_string();
    }

    fn command_text(&self) -> &str {
        &self.state.text
    }

    fn set_command_type(&mut self, command_type: CommandType) {
        self.state.command_type = command_type;
    }

    fn command_type(&self) -> CommandType {
        self.state.command_type
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.state.timeout = timeout;
    }

    fn timeout(&self) -> Duration {
        self.state.timeout
    }

    fn add_parameter(&mut self, parameter: Parameter) {
        self.state.parameters.push(parameter);
    }

    fn parameters(&self) -> &[Parameter] {
        &self.state.parameters
    }

    fn execute_non_query(&mut self) -> Result<u64> {
        self.non_query(false)
    }

    async fn execute_non_query_async(&mut self) -> Result<u64> {
        self.non_query(true)
    }

    fn execute_reader(&mut self) -> Result<Box<dyn DataReader>> {
        self.reader(false)
    }

    async fn execute_reader_async(&mut self) -> Result<Box<dyn DataReader>> {
        self.reader(true)
    }
}
