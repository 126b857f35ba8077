//! In-memory RPC invoker.
//!
//! `MockRpc` answers each command with canned records or a canned failure and
//! remembers every call it received, so tests can assert on the exact
//! commands and parameters the collector sent.

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

use crate::binrpc::{BinRpcError, Record};
use crate::collector::rpc::{RpcError, RpcInvoker};

#[derive(Debug, Clone)]
enum MockReply {
    Records(Vec<Record>),
    Fail(String),
}

/// RPC invoker backed by a command → reply table.
#[derive(Debug, Default)]
pub struct MockRpc {
    replies: HashMap<String, MockReply>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl MockRpc {
    /// Creates an invoker that knows no commands.
    ///
    /// Unknown commands answer with a fault, like Kamailio does.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `command` with `records`.
    pub fn reply(mut self, command: &str, records: Vec<Record>) -> Self {
        self.replies
            .insert(command.to_string(), MockReply::Records(records));
        self
    }

    /// Fails `command` as if the connection was refused.
    pub fn fail(mut self, command: &str, message: &str) -> Self {
        self.replies
            .insert(command.to_string(), MockReply::Fail(message.to_string()));
        self
    }

    /// Every `(command, param)` received so far, in order.
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl RpcInvoker for MockRpc {
    fn invoke(&self, command: &str, param: Option<&str>) -> Result<Vec<Record>, RpcError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((command.to_string(), param.map(str::to_string)));

        match self.replies.get(command) {
            Some(MockReply::Records(records)) => Ok(records.clone()),
            Some(MockReply::Fail(message)) => Err(RpcError::Connect {
                target: "mock".to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, message.clone()),
            }),
            None => Err(RpcError::Protocol {
                command: command.to_string(),
                source: BinRpcError::Fault {
                    code: 500,
                    message: "command not found".to_string(),
                },
            }),
        }
    }
}
