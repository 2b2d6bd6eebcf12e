// MIT License - Copyright (c) 2026 Peter Wright
// Relay transport: framing, connection and command path

pub mod command;
pub mod direct;
pub mod frame;
pub mod probe;

pub use command::CommandSender;
pub use direct::{Connector, TcpConnector};
pub use frame::{read_message, write_message, FrameTimeouts};
