//! 라우팅 모듈
//!
//! 클러스터 환경에서 자동 라우팅을 지원합니다.
//!
//! # 개요
//!
//! 라우팅 드라이버는 `zeta4g://` 스킴을 사용하여 클러스터에 연결합니다.
//! 읽기는 리더로, 쓰기는 라이터로 라우팅됩니다. 라우팅 테이블은 라우터에
//! `CALL dbms.cluster.routing.getServers`를 호출해 얻고, TTL이 지나거나
//! 필요한 역할이 비면 다시 조회합니다.
//!
//! # 예시
//!
//! ```ignore
//! use zeta4g_routing::{AccessMode, RoutingDriver};
//!
//! // transport: Arc<dyn Transport> (Bolt 구현체)
//! let driver = RoutingDriver::new("zeta4g://server1:7687,server2:7687", transport)?;
//!
//! // 쓰기 연결 (라이터로 라우팅)
//! let mut conn = driver.acquire(AccessMode::Write).await?;
//! conn.run("CREATE (n:Person {name: 'Alice'})", HashMap::new()).await?;
//! conn.release().await;
//!
//! driver.close().await?;
//! ```

mod balancer;
mod discovery;
mod driver;
mod table;

pub use balancer::LoadBalancer;
pub use discovery::{DiscoveryManager, RoutingInfo, GET_SERVERS_PROCEDURE};
pub use driver::{is_routing_uri, parse_routing_uri, RoutingDriver, RoutingDriverMetrics};
pub use table::{AccessMode, RoutingTable, ServerRole};
