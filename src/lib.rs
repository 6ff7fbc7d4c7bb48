//! LLM Mock Server
//!
//! Core of a configurable mock server that simulates an LLM-style HTTP and
//! streaming API during tests. Requests are matched against registered
//! endpoint rules and tagged with directives for the mock backend; broadcast
//! contexts let observers subscribe to generated data over a persistent
//! connection.
//!
//! # Features
//!
//! - **Endpoint Rules**: Path patterns with wildcard prefix or suffix matching, optional method
//! - **Request Mutation**: Response shape, streaming mode, and error injection carried as headers and query parameters
//! - **Fail-open Routing**: Unmatched requests pass through untouched
//! - **Context Registry**: Static and dynamic broadcast topics with live subscriber counts
//! - **Broadcast Gateway**: Subscribe, unsubscribe, and fan-out over any real-time transport
//! - **Tick Publisher**: Handlebars payload templates broadcast on an interval
//!
//! # Example Configuration
//!
//! ```yaml
//! endpoints:
//!   - pathPattern: /users
//!     shape: UserList
//!     cacheSize: 3
//!   - pathPattern: /error*
//!     errorConfig:
//!       statusCode: 500
//!       message: boom
//! contexts:
//!   - name: stocks
//!     payload:
//!       symbol: "{{upper context}}"
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod matcher;
pub mod mutator;
pub mod publisher;
pub mod registry;
pub mod request;
pub mod rule;
pub mod server;
pub mod template;

pub use config::MockServerConfig;
pub use engine::{MockClients, MockRoutingEngine};
pub use error::{ConfigError, RequestError, TransportError};
pub use gateway::{BroadcastGateway, ChannelTransport, RealtimeTransport};
pub use registry::ContextRegistry;
pub use request::{MockRequest, RequestDescriptor};
pub use rule::{EndpointRule, EndpointRules};
pub use server::MockServer;
