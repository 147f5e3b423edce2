//! 라우팅 드라이버
//!
//! 클러스터 환경에서 자동 라우팅을 지원하는 드라이버입니다.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::super::driver::{parse_addresses, DriverConfig, ServerAddress};
use super::super::error::{DriverError, DriverResult};
use super::super::pool::{ConnectionPool, PoolMetrics, PooledConnection};
use super::super::transport::Transport;
use super::balancer::LoadBalancer;
use super::discovery::DiscoveryManager;
use super::table::{AccessMode, RoutingTable};

/// 라우팅 URI 스킴
const ROUTING_SCHEMES: [&str; 3] = ["zeta4g://", "zeta4g+s://", "zeta4g+ssc://"];

/// 라우팅 드라이버
///
/// zeta4g:// 스킴을 사용하여 클러스터에 연결합니다.
pub struct RoutingDriver {
    /// 드라이버 설정
    config: DriverConfig,
    /// 로드 밸런서
    balancer: Arc<LoadBalancer>,
    /// 열린 상태
    open: RwLock<bool>,
}

impl RoutingDriver {
    /// 새 라우팅 드라이버 생성
    ///
    /// URI 형식: `zeta4g://host1:port1,host2:port2,...`
    pub fn new(uri: &str, transport: Arc<dyn Transport>) -> DriverResult<Self> {
        let config = DriverConfig::new(uri)?;
        Self::with_config(config, transport)
    }

    /// 설정으로 라우팅 드라이버 생성
    pub fn with_config(config: DriverConfig, transport: Arc<dyn Transport>) -> DriverResult<Self> {
        if config.routers.is_empty() {
            return Err(DriverError::configuration("At least one router is required"));
        }
        if config.max_connection_pool_size == 0 {
            return Err(DriverError::configuration(
                "max_connection_pool_size must be greater than zero",
            ));
        }

        let pool = ConnectionPool::new(transport, config.pool_config());
        let discovery = DiscoveryManager::new(config.routing_procedure.clone());
        let balancer = LoadBalancer::new(config.routers.clone(), pool, discovery);

        info!(routers = ?config.routers, "routing driver created");

        Ok(Self {
            config,
            balancer,
            open: RwLock::new(true),
        })
    }

    /// 드라이버 설정
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// 초기 라우터 목록
    pub fn initial_routers(&self) -> &[ServerAddress] {
        &self.config.routers
    }

    /// 접근 모드에 맞는 연결 획득
    pub async fn acquire(&self, mode: AccessMode) -> DriverResult<PooledConnection> {
        self.ensure_open()?;
        self.balancer.acquire(mode).await
    }

    /// 서버를 라우팅 테이블과 풀에서 제거
    pub async fn forget(&self, address: &ServerAddress) -> DriverResult<()> {
        self.ensure_open()?;
        self.balancer.forget(address).await;
        Ok(())
    }

    /// 현재 라우팅 테이블
    pub fn routing_table(&self) -> Arc<RoutingTable> {
        self.balancer.routing_table()
    }

    /// 연결 테스트
    ///
    /// 필요하면 디스커버리를 실행하고 읽기 연결을 하나 빌렸다가 돌려줍니다.
    pub async fn verify_connectivity(&self) -> DriverResult<()> {
        let conn = self.acquire(AccessMode::Read).await?;
        conn.release().await;
        Ok(())
    }

    /// 드라이버 종료
    pub async fn close(&self) -> DriverResult<()> {
        {
            let mut open = self.open.write();
            if !*open {
                return Ok(());
            }
            *open = false;
        }

        self.balancer.close().await;
        info!("routing driver closed");
        Ok(())
    }

    /// 열린 상태
    pub fn is_open(&self) -> bool {
        *self.open.read()
    }

    /// 드라이버 메트릭
    pub fn metrics(&self) -> RoutingDriverMetrics {
        let pool: &ConnectionPool = self.balancer.pool();
        let table = self.balancer.routing_table();

        RoutingDriverMetrics {
            pool_count: pool.pool_count(),
            pool: pool.metrics(),
            routers: table.routers().len(),
            readers: table.readers().len(),
            writers: table.writers().len(),
        }
    }

    /// 열린 상태 확인
    fn ensure_open(&self) -> DriverResult<()> {
        if *self.open.read() {
            Ok(())
        } else {
            Err(DriverError::session("Driver is closed"))
        }
    }
}

impl fmt::Debug for RoutingDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingDriver")
            .field("initial_routers", &self.config.routers)
            .field("open", &*self.open.read())
            .field("balancer", &self.balancer)
            .finish()
    }
}

/// 라우팅 드라이버 메트릭
#[derive(Debug, Clone, Default)]
pub struct RoutingDriverMetrics {
    /// 주소 풀 수
    pub pool_count: usize,
    /// 전체 풀 메트릭
    pub pool: PoolMetrics,
    /// 라우터 수
    pub routers: usize,
    /// 리더 수
    pub readers: usize,
    /// 라이터 수
    pub writers: usize,
}

/// URI가 라우팅 드라이버용인지 확인
pub fn is_routing_uri(uri: &str) -> bool {
    ROUTING_SCHEMES.iter().any(|scheme| uri.starts_with(scheme))
}

/// URI에서 다중 라우터 파싱
pub fn parse_routing_uri(uri: &str) -> DriverResult<Vec<ServerAddress>> {
    if !is_routing_uri(uri) {
        return Err(DriverError::configuration(format!(
            "Not a routing URI: {}",
            uri
        )));
    }
    parse_addresses(uri)
}
