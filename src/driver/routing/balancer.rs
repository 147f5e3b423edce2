//! 로드 밸런서
//!
//! 라우팅 테이블, 연결 풀, 디스커버리를 묶어 접근 모드별로 연결을 빌려줍니다.
//!
//! - 테이블은 `RwLock<Arc<RoutingTable>>`로 게시되고 통째로 교체됩니다.
//! - 디스커버리는 한 번에 하나만 실행됩니다. 기다리던 호출자는 락을 얻은 뒤
//!   테이블을 다시 확인합니다.
//! - 빌려준 연결에서 생긴 에러는 [`ConnectionErrorHandler`]를 통해 토폴로지에
//!   반영됩니다.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::super::driver::ServerAddress;
use super::super::error::{codes, DriverError, DriverResult};
use super::super::pool::{ConnectionErrorHandler, ConnectionPool, PassThroughHandler, PooledConnection};
use super::discovery::{DiscoveryManager, RoutingInfo};
use super::table::{AccessMode, RoutingTable};

/// 후보 주소 하나에 대한 획득 결과
enum Acquisition {
    Acquired(PooledConnection),
    NoCandidate,
    Unreachable(ServerAddress, DriverError),
    Fatal(DriverError),
}

/// 라우터 하나에 대한 디스커버리 결과
enum DiscoveryOutcome {
    Discovered(RoutingInfo),
    NotARouter(DriverError),
    Unreachable(DriverError),
    Fatal(DriverError),
}

/// 로드 밸런서
pub struct LoadBalancer {
    /// 현재 게시된 라우팅 테이블
    table: RwLock<Arc<RoutingTable>>,
    /// 연결 풀
    pool: ConnectionPool,
    /// 디스커버리
    discovery: DiscoveryManager,
    /// 디스커버리 단일 실행 락
    discovery_lock: tokio::sync::Mutex<()>,
}

impl LoadBalancer {
    /// 시드 라우터로 생성
    pub fn new(
        routers: Vec<ServerAddress>,
        pool: ConnectionPool,
        discovery: DiscoveryManager,
    ) -> Arc<Self> {
        Arc::new(Self {
            table: RwLock::new(Arc::new(RoutingTable::seed(routers))),
            pool,
            discovery,
            discovery_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// 현재 라우팅 테이블 스냅샷
    pub fn routing_table(&self) -> Arc<RoutingTable> {
        self.table.read().clone()
    }

    /// 연결 풀
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// 접근 모드에 맞는 연결 획득
    ///
    /// 도달할 수 없는 후보는 잊고 다음 후보로 넘어갑니다. 후보를 모두
    /// 소진하면 [`DriverError::SessionExpired`]를 반환합니다.
    pub async fn acquire(self: &Arc<Self>, mode: AccessMode) -> DriverResult<PooledConnection> {
        self.ensure_discovery(mode).await?;

        let attempts = self.routing_table().servers_for(mode).len();
        for _ in 0..attempts {
            match self.try_next(mode).await {
                Acquisition::Acquired(conn) => return Ok(conn),
                Acquisition::NoCandidate => break,
                Acquisition::Unreachable(address, err) => {
                    warn!(%address, error = %err, "server unreachable, forgetting it");
                    self.forget(&address).await;
                }
                Acquisition::Fatal(err) => return Err(err),
            }
        }

        Err(DriverError::session_expired(format!(
            "Failed to connect to any {} server",
            mode.as_str()
        )))
    }

    async fn try_next(self: &Arc<Self>, mode: AccessMode) -> Acquisition {
        // 실패한 후보에서도 커서는 앞으로 움직임
        let Some(address) = self.routing_table().next_for(mode) else {
            return Acquisition::NoCandidate;
        };

        let handler = Arc::new(RoutingErrorHandler {
            address: address.clone(),
            balancer: Arc::downgrade(self),
        });

        match self.pool.try_acquire(&address, handler).await {
            Ok(conn) => Acquisition::Acquired(conn),
            Err(err) if err.is_connection_error() => Acquisition::Unreachable(address, err),
            Err(err) => Acquisition::Fatal(err),
        }
    }

    /// 테이블이 부족하면 디스커버리 실행
    async fn ensure_discovery(&self, mode: AccessMode) -> DriverResult<()> {
        if !self.routing_table().is_stale_for(mode) {
            return Ok(());
        }

        let _guard = self.discovery_lock.lock().await;

        // 기다리는 동안 다른 호출자가 갱신했을 수 있음
        let current = self.routing_table();
        if !current.is_stale_for(mode) {
            return Ok(());
        }

        let table = self.new_cluster_view(&current).await?;
        let addresses = table.all();
        info!(
            routers = ?table.routers(),
            readers = ?table.readers(),
            writers = ?table.writers(),
            ttl = ?table.ttl(),
            "routing table updated"
        );

        *self.table.write() = Arc::new(table);
        self.pool.update(&addresses).await;

        Ok(())
    }

    /// 현재 라우터들로 새 클러스터 뷰 계산
    ///
    /// 각 라우터는 최대 한 번 시도됩니다. 게시된 테이블은 바뀌지 않습니다.
    async fn new_cluster_view(&self, current: &RoutingTable) -> DriverResult<RoutingTable> {
        let mut tried = HashSet::new();

        for _ in 0..current.routers().len() {
            let Some(router) = current.next_router() else {
                break;
            };
            if !tried.insert(router.clone()) {
                continue;
            }

            match self.discover_from(&router).await {
                DiscoveryOutcome::Discovered(info) => {
                    debug!(%router, "discovery answered");
                    return Ok(RoutingTable::from_routing_info(info));
                }
                DiscoveryOutcome::NotARouter(err) => {
                    warn!(%router, error = %err, "invalid discovery, skipping router");
                }
                DiscoveryOutcome::Unreachable(err) => {
                    warn!(%router, error = %err, "router unreachable");
                }
                DiscoveryOutcome::Fatal(err) => return Err(err),
            }
        }

        Err(DriverError::server_unavailable(
            "Failed to connect to any routing server",
        ))
    }

    async fn discover_from(&self, router: &ServerAddress) -> DiscoveryOutcome {
        let mut conn = match self.pool.try_acquire(router, Arc::new(PassThroughHandler)).await {
            Ok(conn) => conn,
            Err(err) if err.is_connection_error() => return DiscoveryOutcome::Unreachable(err),
            Err(err) => return DiscoveryOutcome::Fatal(err),
        };

        let result = self.discovery.discover(&mut conn).await;
        conn.release().await;

        match result {
            Ok(info) => DiscoveryOutcome::Discovered(info),
            Err(err @ DriverError::InvalidDiscovery(_)) => DiscoveryOutcome::NotARouter(err),
            Err(err @ DriverError::SessionExpired(_)) => DiscoveryOutcome::Unreachable(err),
            Err(err) => DiscoveryOutcome::Fatal(err),
        }
    }

    /// 주소를 테이블에서 지우고 풀에서 정리
    pub async fn forget(&self, address: &ServerAddress) {
        {
            let mut table = self.table.write();
            let updated = table.remove(address);
            *table = Arc::new(updated);
        }
        self.pool.purge(address).await;
        debug!(%address, "forgot server");
    }

    /// 주소를 라이터 역할에서만 제거
    pub fn remove_writer(&self, address: &ServerAddress) {
        let mut table = self.table.write();
        let updated = table.remove_writer(address);
        *table = Arc::new(updated);
        debug!(%address, "removed server from writers");
    }

    /// 풀 닫기
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("table", &*self.table.read())
            .field("pool", &self.pool)
            .field("discovery", &self.discovery)
            .finish()
    }
}

// ============================================================================
// RoutingErrorHandler - 연결 에러 분류
// ============================================================================

/// 빌려준 연결의 에러를 테이블과 풀에 반영하는 훅
#[derive(Debug)]
struct RoutingErrorHandler {
    address: ServerAddress,
    balancer: Weak<LoadBalancer>,
}

#[async_trait]
impl ConnectionErrorHandler for RoutingErrorHandler {
    async fn on_connection_error(&self, error: DriverError) -> DriverError {
        if let Some(balancer) = self.balancer.upgrade() {
            balancer.forget(&self.address).await;
        }
        DriverError::session_expired(format!(
            "Server at {} is no longer available: {}",
            self.address, error
        ))
    }

    async fn on_server_error(&self, error: DriverError) -> DriverError {
        match error.server_code() {
            Some(codes::NOT_A_LEADER) => {
                if let Some(balancer) = self.balancer.upgrade() {
                    balancer.remove_writer(&self.address);
                }
                DriverError::session_expired(format!(
                    "Server at {} no longer accepts writes",
                    self.address
                ))
            }
            Some(codes::FORBIDDEN_ON_READ_ONLY_DATABASE) => {
                DriverError::client("Write queries cannot be performed in READ access mode.")
            }
            _ => error,
        }
    }
}
