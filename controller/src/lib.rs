pub mod command;
pub mod control_loop;
pub mod roaster;
pub mod timer;
pub mod transport;

#[cfg(test)]
mod testing;

pub use command::{Command, CompletionCallback, ConnectCallback, RoasterObserver};
pub use roaster::Roaster;
pub use transport::{Connector, SerialConnector, Transport, TransportError};
