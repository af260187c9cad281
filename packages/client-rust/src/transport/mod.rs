//! Reference TCP transport: a pipelining client and a caching factory.

pub mod factory;
pub mod tcp;

pub use factory::TcpTransportClientFactory;
pub use tcp::TcpTransportClient;
