//! # Zeta4G Routing
//!
//! Cluster routing core for the [Zeta4G](https://github.com/zeta9044/zeta4g) graph
//! database driver.
//!
//! ## Features
//!
//! - **Cluster Discovery** - Routing tables fetched from router members with `getServers`
//! - **Access Modes** - Reads go to readers, writes go to writers
//! - **Connection Pooling** - Per-address pools with lifetime and capacity limits
//! - **Failure Handling** - Unreachable servers are forgotten, demoted leaders lose the writer role
//! - **Async/Await** - Built on Tokio
//!
//! ## Quick Start
//!
//! The routing core does not speak the wire protocol itself. Plug in a
//! [`Transport`] that opens connections to cluster members:
//!
//! ```rust,ignore
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use zeta4g_routing::{AccessMode, RoutingDriver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(MyBoltTransport::default());
//!     let driver = RoutingDriver::new("zeta4g://server1:7687,server2:7687", transport)?;
//!
//!     // Write goes to the current leader
//!     let mut conn = driver.acquire(AccessMode::Write).await?;
//!     conn.run("CREATE (n:Person {name: 'Alice'})", HashMap::new()).await?;
//!     conn.release().await;
//!
//!     driver.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Customize pool and discovery behavior with [`DriverConfig`]:
//!
//! ```rust
//! use zeta4g_routing::DriverConfig;
//! use std::time::Duration;
//!
//! let config = DriverConfig::builder("zeta4g://server1:7687,server2:7687")
//!     .unwrap()
//!     .with_max_connection_pool_size(50)
//!     .with_connection_timeout(Duration::from_secs(10))
//!     .build();
//!
//! assert_eq!(config.routers.len(), 2);
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`DriverResult`]. Callers retry on
//! [`DriverError::SessionExpired`]; [`DriverError::ServerUnavailable`] means no
//! router could be reached and the driver must be re-seeded.
//!
//! ```rust
//! use zeta4g_routing::{DriverConfig, DriverError};
//!
//! match DriverConfig::new("zeta4g://") {
//!     Ok(config) => println!("routers: {:?}", config.routers),
//!     Err(DriverError::Configuration(msg)) => eprintln!("Invalid URI: {}", msg),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - Addresses, configuration, pool and routing types
//!

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod driver;

// Re-exports for convenience
pub use driver::{
    AccessMode, ConnectionPool, DriverConfig, DriverConfigBuilder, DriverError, DriverResult,
    PoolConfig, PooledConnection, RawConnection, Record, RoutingDriver, RoutingTable,
    ServerAddress, Transport, Value,
};

/// Config alias for convenience
pub type Config = DriverConfig;
