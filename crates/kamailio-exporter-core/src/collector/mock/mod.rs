//! Scripted RPC invoker for testing collectors without a running Kamailio.

mod rpc;
mod scenarios;

pub use rpc::MockRpc;
