//! Driver Module
//!
//! 클러스터 라우팅 코어
//!
//! # Milestones
//!
//! - M9.1: 서버 주소와 드라이버 설정 (ServerAddress, DriverConfig)
//! - M9.2: 연결 풀링 (ConnectionPool, PoolConfig)
//! - M9.5: 라우팅 드라이버 (RoutingDriver, RoutingTable, LoadBalancer)
//!
//! # Example
//!
//! ```ignore
//! use zeta4g_routing::driver::routing::RoutingDriver;
//! use zeta4g_routing::driver::AccessMode;
//!
//! // 라우팅 드라이버 (zeta4g://) - 클러스터용
//! let driver = RoutingDriver::new("zeta4g://server1:7687,server2:7687", transport)?;
//!
//! // 읽기 연결 (리더로 자동 라우팅)
//! let conn = driver.acquire(AccessMode::Read).await?;
//! conn.release().await;
//!
//! driver.close().await?;
//! ```

pub mod routing;
mod driver;
mod error;
mod pool;
mod transport;
mod types;

#[cfg(test)]
mod testing;

// Re-exports
pub use driver::{DriverConfig, DriverConfigBuilder, ServerAddress, DEFAULT_PORT};
pub use error::{codes, DriverError, DriverResult};
pub use pool::{
    ConnectionErrorHandler, ConnectionPool, ConnectionState, PassThroughHandler, PoolConfig,
    PoolConfigBuilder, PoolMetrics, PooledConnection,
};
pub use routing::{AccessMode, RoutingDriver, RoutingTable};
pub use transport::{RawConnection, Transport};
pub use types::{Record, Value};
