//! Courier Client: remote invocation dispatcher with address resolution,
//! health tracking, and a TCP transport.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod module;
pub mod resolver;
pub mod telemetry;
pub mod traits;
pub mod transport;

pub use config::{ClientConfig, HealthCheckConfig, SelectorMode, TransportConfig};
pub use dispatcher::InvokeDispatcher;
pub use error::{FaultKind, InvokeError, TransportError};
pub use health::{FailureCountingHealthCheck, HealthMonitor};
pub use module::ClientModule;
pub use resolver::StaticAddressResolver;
pub use traits::{
    AddressResolver, HealthCheckService, RemoteInvoker, TransportClient, TransportClientFactory,
};
pub use transport::{TcpTransportClient, TcpTransportClientFactory};
