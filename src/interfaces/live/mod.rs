//! Per-client duplex channel: server list on open, periodic metrics, and one
//! reply per control message.

pub mod messages;
mod session;
mod socket;

pub use messages::{InboundMessage, OutboundEvent, ServerSummary};
pub use session::{ClientFrame, ClientRegistry, handle_message, run_client_session, server_list};
pub use socket::live_socket_endpoint;
