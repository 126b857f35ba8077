//! RPC command invocation over the Kamailio control socket.
//!
//! Every call uses its own connection, closed when the call returns. A
//! `RpcClient` holds no connection state and can be shared between threads.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

use rand_core::{OsRng, RngCore};
use tracing::{debug, error};

use crate::binrpc::{BinRpcError, Record, ValueError, read_reply, write_request};
use crate::config::{Config, Transport};

/// Errors raised by an RPC round trip.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("{command}: {source}")]
    Protocol {
        command: String,
        #[source]
        source: BinRpcError,
    },
    #[error("{0} is not supported on this platform")]
    UnsupportedTransport(String),
    #[error("{command}: empty reply")]
    EmptyReply { command: String },
    #[error("{command}: unexpected reply shape: {source}")]
    UnexpectedShape {
        command: String,
        #[source]
        source: ValueError,
    },
}

/// Executes one RPC command and returns the reply records.
pub trait RpcInvoker: Send + Sync {
    fn invoke(&self, command: &str, param: Option<&str>) -> Result<Vec<Record>, RpcError>;
}

/// BINRPC client for a unix socket or TCP endpoint.
#[derive(Debug, Clone)]
pub struct RpcClient {
    transport: Transport,
    timeout: Option<Duration>,
}

impl RpcClient {
    pub fn new(transport: Transport, timeout: Option<Duration>) -> Self {
        Self { transport, timeout }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.transport.clone(), config.timeout)
    }

    fn connect(&self) -> Result<Connection, RpcError> {
        let connect_err = |source| RpcError::Connect {
            target: self.transport.to_string(),
            source,
        };
        match &self.transport {
            #[cfg(unix)]
            Transport::Unix(path) => {
                let stream = UnixStream::connect(path).map_err(connect_err)?;
                stream.set_read_timeout(self.timeout).map_err(connect_err)?;
                stream.set_write_timeout(self.timeout).map_err(connect_err)?;
                Ok(Connection::Unix(stream))
            }
            #[cfg(not(unix))]
            Transport::Unix(_) => Err(RpcError::UnsupportedTransport(self.transport.to_string())),
            Transport::Tcp { host, port } => {
                let stream = connect_tcp(host, *port, self.timeout).map_err(connect_err)?;
                stream.set_read_timeout(self.timeout).map_err(connect_err)?;
                stream.set_write_timeout(self.timeout).map_err(connect_err)?;
                stream.set_nodelay(true).map_err(connect_err)?;
                Ok(Connection::Tcp(stream))
            }
        }
    }
}

impl RpcInvoker for RpcClient {
    fn invoke(&self, command: &str, param: Option<&str>) -> Result<Vec<Record>, RpcError> {
        debug!(command, param, target = %self.transport, "sending rpc request");

        let mut conn = self.connect().inspect_err(|e| {
            error!(command, error = %e, "could not connect to kamailio");
        })?;

        let protocol_err = |source| RpcError::Protocol {
            command: command.to_string(),
            source,
        };

        let cookie = OsRng.next_u32();
        write_request(&mut conn, command, param, cookie)
            .map_err(protocol_err)
            .inspect_err(|e| error!(command, error = %e, "failed to send rpc request"))?;

        let records = read_reply(&mut conn, cookie)
            .map_err(protocol_err)
            .inspect_err(|e| error!(command, error = %e, "failed to read rpc reply"))?;

        debug!(command, records = records.len(), "received rpc reply");
        Ok(records)
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let Some(timeout) = timeout else {
        return TcpStream::connect((host, port));
    };
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "host resolved to no addresses")
    }))
}

/// An open control connection.
enum Connection {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            Connection::Unix(s) => s.read(buf),
            Connection::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            Connection::Unix(s) => s.write(buf),
            Connection::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            #[cfg(unix)]
            Connection::Unix(s) => s.flush(),
            Connection::Tcp(s) => s.flush(),
        }
    }
}
