//! M9.2: Connection Pool
//!
//! 주소별 연결 풀링
//!
//! [`ConnectionPool`]은 클러스터 주소마다 하나의 주소 풀을 두고 연결을
//! 빌려주고 돌려받습니다. 라우팅 테이블에서 사라진 주소는 [`ConnectionPool::update`]
//! 또는 [`ConnectionPool::purge`]로 정리됩니다.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::driver::ServerAddress;
use super::error::{DriverError, DriverResult};
use super::transport::{RawConnection, Transport};
use super::types::{Record, Value};

// ============================================================================
// PoolConfig - 풀 설정
// ============================================================================

/// 연결 풀 설정
///
/// | 필드 | 기본값 | 설명 |
/// |------|--------|------|
/// | `max_size` | 100 | 주소별 동시에 빌려줄 수 있는 최대 연결 수 |
/// | `max_lifetime` | 1시간 | 연결 최대 수명 |
/// | `idle_timeout` | 5분 | 유휴 타임아웃 |
/// | `connection_timeout` | 30초 | 전송 계층 연결 타임아웃 |
/// | `acquisition_timeout` | 60초 | 풀 용량 대기 타임아웃 |
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 최대 연결 수
    pub max_size: usize,
    /// 연결 최대 수명
    pub max_lifetime: Duration,
    /// 유휴 타임아웃
    pub idle_timeout: Duration,
    /// 연결 타임아웃
    pub connection_timeout: Duration,
    /// 연결 획득 타임아웃
    pub acquisition_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            max_lifetime: Duration::from_secs(3600),
            idle_timeout: Duration::from_secs(300),
            connection_timeout: Duration::from_secs(30),
            acquisition_timeout: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    /// 빌더 패턴으로 풀 설정 생성
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }
}

/// 풀 설정 빌더
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// 최대 연결 수 설정
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    /// 연결 최대 수명 설정
    pub fn max_lifetime(mut self, duration: Duration) -> Self {
        self.config.max_lifetime = duration;
        self
    }

    /// 유휴 타임아웃 설정
    pub fn idle_timeout(mut self, duration: Duration) -> Self {
        self.config.idle_timeout = duration;
        self
    }

    /// 연결 타임아웃 설정
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// 연결 획득 타임아웃 설정
    pub fn acquisition_timeout(mut self, duration: Duration) -> Self {
        self.config.acquisition_timeout = duration;
        self
    }

    /// 설정 빌드
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

// ============================================================================
// ConnectionErrorHandler - 연결 에러 훅
// ============================================================================

/// 빌려준 연결에서 발생한 에러를 소유 주소로 되돌려 보내는 훅
///
/// 풀은 연결을 빌려줄 때 이 훅을 함께 붙입니다. 연결 사용 중 실패가
/// 발생하면 호출자가 주소를 추적하지 않아도 훅이 토폴로지를 정리하고
/// 호출자에게 보여줄 에러를 돌려줍니다.
#[async_trait]
pub trait ConnectionErrorHandler: Send + Sync + fmt::Debug {
    /// 전송 계층 실패 (소켓 리셋, 타임아웃)
    async fn on_connection_error(&self, error: DriverError) -> DriverError;

    /// 서버가 보고한 실패
    async fn on_server_error(&self, error: DriverError) -> DriverError;
}

/// 에러를 그대로 전달하는 훅
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughHandler;

#[async_trait]
impl ConnectionErrorHandler for PassThroughHandler {
    async fn on_connection_error(&self, error: DriverError) -> DriverError {
        error
    }

    async fn on_server_error(&self, error: DriverError) -> DriverError {
        error
    }
}

// ============================================================================
// ConnectionState - 연결 상태
// ============================================================================

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// 유휴 상태
    Idle,
    /// 사용 중
    InUse,
    /// 닫힘
    Closed,
    /// 오류
    Failed,
}

// ============================================================================
// PooledConnection - 풀링된 연결
// ============================================================================

/// 풀링된 연결
///
/// 빌려간 쪽이나 풀 중 한 곳만 소유합니다. 사용이 끝나면
/// [`PooledConnection::release`]로 돌려줘야 합니다.
pub struct PooledConnection {
    /// 연결 ID
    id: u64,
    /// 서버 주소
    address: ServerAddress,
    /// 생성 시간
    created_at: Instant,
    /// 마지막 사용 시간
    last_used: Instant,
    /// 상태
    state: ConnectionState,
    /// 전송 계층 연결
    raw: Option<Box<dyn RawConnection>>,
    /// 빌려준 주소 풀
    pool: Option<Arc<AddressPool>>,
    /// 에러 훅
    handler: Option<Arc<dyn ConnectionErrorHandler>>,
    /// 용량 허가
    permit: Option<OwnedSemaphorePermit>,
}

impl PooledConnection {
    fn new(id: u64, address: ServerAddress, raw: Box<dyn RawConnection>) -> Self {
        let now = Instant::now();
        Self {
            id,
            address,
            created_at: now,
            last_used: now,
            state: ConnectionState::Idle,
            raw: Some(raw),
            pool: None,
            handler: None,
            permit: None,
        }
    }

    /// 연결 ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 서버 주소
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// 생성 시간
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// 마지막 사용 시간
    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// 연결 상태
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// 쿼리 실행
    ///
    /// 실패는 획득 시점에 붙은 에러 훅을 거쳐 반환됩니다.
    pub async fn run(
        &mut self,
        query: &str,
        parameters: HashMap<String, Value>,
    ) -> DriverResult<Vec<Record>> {
        let raw = match self.raw.as_mut() {
            Some(raw) => raw,
            None => {
                return Err(DriverError::connection(format!(
                    "Connection to {} is closed",
                    self.address
                )))
            }
        };
        self.last_used = Instant::now();

        let result = raw.run(query, parameters).await;
        match result {
            Ok(records) => Ok(records),
            Err(err) => Err(self.handle_error(err).await),
        }
    }

    /// 연결 상태 초기화
    pub async fn reset(&mut self) -> DriverResult<()> {
        let raw = match self.raw.as_mut() {
            Some(raw) => raw,
            None => {
                return Err(DriverError::connection(format!(
                    "Connection to {} is closed",
                    self.address
                )))
            }
        };

        let result = raw.reset().await;
        match result {
            Ok(()) => Ok(()),
            Err(err) => Err(self.handle_error(err).await),
        }
    }

    async fn handle_error(&mut self, err: DriverError) -> DriverError {
        if err.is_connection_error() {
            self.mark_failed();
        }

        let Some(handler) = self.handler.clone() else {
            return err;
        };

        if err.is_connection_error() {
            handler.on_connection_error(err).await
        } else if err.is_server_error() {
            handler.on_server_error(err).await
        } else {
            err
        }
    }

    /// 풀로 반환
    ///
    /// 건강한 연결은 유휴 목록으로, 그렇지 않으면 닫힙니다. 실패하지 않습니다.
    pub async fn release(mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(self).await;
        }
    }

    /// 유휴 연결로 재사용 가능한지 확인
    fn is_valid(&self, config: &PoolConfig) -> bool {
        if !self.is_reusable(config) {
            return false;
        }

        self.last_used.elapsed() < config.idle_timeout
    }

    /// 반환 시 재사용 가능한지 확인
    fn is_reusable(&self, config: &PoolConfig) -> bool {
        if self.state == ConnectionState::Closed || self.state == ConnectionState::Failed {
            return false;
        }

        if !self.raw.as_ref().is_some_and(|raw| raw.is_open()) {
            return false;
        }

        self.created_at.elapsed() < config.max_lifetime
    }

    fn lend(
        &mut self,
        pool: Arc<AddressPool>,
        handler: Arc<dyn ConnectionErrorHandler>,
        permit: OwnedSemaphorePermit,
    ) {
        self.state = ConnectionState::InUse;
        self.last_used = Instant::now();
        self.pool = Some(pool);
        self.handler = Some(handler);
        self.permit = Some(permit);
    }

    fn mark_idle(&mut self) {
        self.state = ConnectionState::Idle;
        self.last_used = Instant::now();
    }

    fn mark_failed(&mut self) {
        self.state = ConnectionState::Failed;
    }

    async fn close(&mut self) {
        self.state = ConnectionState::Closed;
        if let Some(mut raw) = self.raw.take() {
            raw.close().await;
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("state", &self.state)
            .field("age", &self.created_at.elapsed())
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        // 반환되지 않고 버려진 연결
        if let Some(pool) = self.pool.take() {
            self.state = ConnectionState::Closed;
            pool.abandon();
        }
    }
}

// ============================================================================
// PoolMetrics - 풀 메트릭
// ============================================================================

/// 풀 메트릭
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// 현재 크기
    pub size: usize,
    /// 유휴 연결 수
    pub idle: usize,
    /// 사용 중인 연결 수
    pub in_use: usize,
    /// 총 획득 횟수
    pub total_acquisitions: u64,
    /// 총 생성 횟수
    pub total_created: u64,
    /// 총 닫힌 연결 수
    pub total_closed: u64,
    /// 총 타임아웃 횟수
    pub total_timeouts: u64,
}

impl PoolMetrics {
    fn merge(mut self, other: PoolMetrics) -> Self {
        self.size += other.size;
        self.idle += other.idle;
        self.in_use += other.in_use;
        self.total_acquisitions += other.total_acquisitions;
        self.total_created += other.total_created;
        self.total_closed += other.total_closed;
        self.total_timeouts += other.total_timeouts;
        self
    }
}

// ============================================================================
// AddressPool - 주소별 풀
// ============================================================================

#[derive(Debug)]
struct IdleConnections {
    connections: VecDeque<PooledConnection>,
    open: bool,
}

/// 단일 주소의 연결 풀
struct AddressPool {
    /// 서버 주소
    address: ServerAddress,
    /// 풀 설정
    config: PoolConfig,
    /// 유휴 연결들 (열린 상태 포함)
    idle: Mutex<IdleConnections>,
    /// 세마포어 (빌려준 연결 수 제한)
    semaphore: Arc<Semaphore>,
    /// 현재 크기
    size: AtomicUsize,
    /// 사용 중인 연결 수
    in_use: AtomicUsize,
    /// 총 생성 횟수
    total_created: AtomicU64,
    /// 총 획득 횟수
    total_acquisitions: AtomicU64,
    /// 총 닫힌 횟수
    total_closed: AtomicU64,
    /// 총 타임아웃 횟수
    total_timeouts: AtomicU64,
    /// 다음 연결 ID
    next_id: AtomicU64,
}

impl AddressPool {
    fn new(address: ServerAddress, config: PoolConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_size));

        Self {
            address,
            config,
            idle: Mutex::new(IdleConnections {
                connections: VecDeque::new(),
                open: true,
            }),
            semaphore,
            size: AtomicUsize::new(0),
            in_use: AtomicUsize::new(0),
            total_created: AtomicU64::new(0),
            total_acquisitions: AtomicU64::new(0),
            total_closed: AtomicU64::new(0),
            total_timeouts: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    fn is_open(&self) -> bool {
        self.idle.lock().open
    }

    fn purged_error(&self) -> DriverError {
        DriverError::connection(format!("Pool for {} has been purged", self.address))
    }

    /// 연결 획득
    async fn acquire(
        self: &Arc<Self>,
        transport: &dyn Transport,
        handler: Arc<dyn ConnectionErrorHandler>,
    ) -> DriverResult<PooledConnection> {
        if !self.is_open() {
            return Err(self.purged_error());
        }

        // 세마포어 획득 (타임아웃)
        let permit = match tokio::time::timeout(
            self.config.acquisition_timeout,
            self.semaphore.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(self.purged_error()),
            Err(_) => {
                self.total_timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(DriverError::timeout(format!(
                    "Unable to acquire a connection to {} within {:?}",
                    self.address, self.config.acquisition_timeout
                )));
            }
        };

        let (idle, expired) = self.take_idle();
        for mut conn in expired {
            conn.close().await;
        }

        let mut conn = match idle {
            Some(conn) => conn,
            None => self.create_connection(transport).await?,
        };

        conn.lend(self.clone(), handler, permit);
        self.total_acquisitions.fetch_add(1, Ordering::Relaxed);
        self.in_use.fetch_add(1, Ordering::Relaxed);

        Ok(conn)
    }

    /// 유휴 연결 가져오기 (만료된 연결은 따로 반환)
    fn take_idle(&self) -> (Option<PooledConnection>, Vec<PooledConnection>) {
        let mut idle = self.idle.lock();
        let mut expired = Vec::new();

        while let Some(conn) = idle.connections.pop_front() {
            if conn.is_valid(&self.config) {
                return (Some(conn), expired);
            }
            self.size.fetch_sub(1, Ordering::Relaxed);
            self.total_closed.fetch_add(1, Ordering::Relaxed);
            expired.push(conn);
        }

        (None, expired)
    }

    /// 새 연결 생성
    async fn create_connection(&self, transport: &dyn Transport) -> DriverResult<PooledConnection> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let raw = tokio::time::timeout(self.config.connection_timeout, transport.open(&self.address))
            .await
            .map_err(|_| {
                DriverError::connection(format!(
                    "Connection to {} timed out after {:?}",
                    self.address, self.config.connection_timeout
                ))
            })??;

        self.size.fetch_add(1, Ordering::Relaxed);
        self.total_created.fetch_add(1, Ordering::Relaxed);
        debug!(address = %self.address, id, "opened new connection");

        Ok(PooledConnection::new(id, self.address.clone(), raw))
    }

    /// 연결 반환
    async fn release(&self, mut conn: PooledConnection) {
        conn.handler = None;
        // 유휴 목록에 넣은 뒤에 용량을 돌려줌
        let _permit = conn.permit.take();
        self.in_use.fetch_sub(1, Ordering::Relaxed);

        let conn = if conn.is_reusable(&self.config) {
            conn.mark_idle();
            let mut idle = self.idle.lock();
            if idle.open {
                idle.connections.push_back(conn);
                return;
            }
            conn
        } else {
            conn
        };

        self.discard(conn).await;
    }

    /// 반환되지 않은 연결 정리
    fn abandon(&self) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        self.size.fetch_sub(1, Ordering::Relaxed);
        self.total_closed.fetch_add(1, Ordering::Relaxed);
    }

    async fn discard(&self, mut conn: PooledConnection) {
        conn.close().await;
        self.size.fetch_sub(1, Ordering::Relaxed);
        self.total_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// 풀 닫기
    ///
    /// 유휴 연결은 즉시, 빌려준 연결은 반환될 때 닫힙니다.
    async fn close(&self) {
        let drained: Vec<PooledConnection> = {
            let mut idle = self.idle.lock();
            idle.open = false;
            idle.connections.drain(..).collect()
        };
        self.semaphore.close();

        for conn in drained {
            self.discard(conn).await;
        }
    }

    fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            size: self.size.load(Ordering::Relaxed),
            idle: self.idle.lock().connections.len(),
            in_use: self.in_use.load(Ordering::Relaxed),
            total_acquisitions: self.total_acquisitions.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_closed: self.total_closed.load(Ordering::Relaxed),
            total_timeouts: self.total_timeouts.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for AddressPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressPool")
            .field("address", &self.address)
            .field("size", &self.size.load(Ordering::Relaxed))
            .field("in_use", &self.in_use.load(Ordering::Relaxed))
            .finish()
    }
}

// ============================================================================
// ConnectionPool - 연결 풀
// ============================================================================

/// 클러스터 연결 풀
///
/// 라우팅 테이블에 있는 주소라도 첫 획득 전까지는 풀 항목이 없을 수 있습니다.
pub struct ConnectionPool {
    /// 전송 계층
    transport: Arc<dyn Transport>,
    /// 풀 설정
    config: PoolConfig,
    /// 주소별 풀
    pools: RwLock<HashMap<ServerAddress, Arc<AddressPool>>>,
    /// 열린 상태
    open: RwLock<bool>,
}

impl ConnectionPool {
    /// 새 연결 풀 생성
    pub fn new(transport: Arc<dyn Transport>, config: PoolConfig) -> Self {
        Self {
            transport,
            config,
            pools: RwLock::new(HashMap::new()),
            open: RwLock::new(true),
        }
    }

    /// 풀 설정
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// 연결 획득
    ///
    /// 유휴 연결이 있으면 재사용하고, 없으면 전송 계층으로 새로 엽니다.
    pub async fn try_acquire(
        &self,
        address: &ServerAddress,
        handler: Arc<dyn ConnectionErrorHandler>,
    ) -> DriverResult<PooledConnection> {
        if !*self.open.read() {
            return Err(DriverError::server_unavailable(format!(
                "Connection pool is closed, unable to connect to {}",
                address
            )));
        }

        let pool = self.get_or_create_pool(address);
        match pool.acquire(self.transport.as_ref(), handler).await {
            Ok(conn) => {
                debug!(%address, id = conn.id(), "acquired connection");
                Ok(conn)
            }
            Err(err) => {
                if err.is_connection_error() {
                    self.remove_if_empty(address, &pool);
                }
                Err(err)
            }
        }
    }

    /// 연결 반환
    pub async fn release(&self, conn: PooledConnection) {
        conn.release().await;
    }

    /// 주소 집합에 없는 항목 정리
    pub async fn update(&self, addresses: &HashSet<ServerAddress>) {
        let removed: Vec<Arc<AddressPool>> = {
            let mut pools = self.pools.write();
            let stale: Vec<ServerAddress> = pools
                .keys()
                .filter(|address| !addresses.contains(*address))
                .cloned()
                .collect();
            stale.iter().filter_map(|address| pools.remove(address)).collect()
        };

        for pool in removed {
            debug!(address = %pool.address, "removing pool for address no longer routed");
            pool.close().await;
        }
    }

    /// 주소의 모든 연결 정리
    pub async fn purge(&self, address: &ServerAddress) {
        let removed = self.pools.write().remove(address);
        if let Some(pool) = removed {
            debug!(%address, "purging pool");
            pool.close().await;
        }
    }

    /// 풀 닫기
    pub async fn close(&self) {
        *self.open.write() = false;

        let removed: Vec<Arc<AddressPool>> = self.pools.write().drain().map(|(_, p)| p).collect();
        for pool in removed {
            pool.close().await;
        }
    }

    /// 열린 상태
    pub fn is_open(&self) -> bool {
        *self.open.read()
    }

    /// 풀 항목이 있는 주소
    pub fn addresses(&self) -> HashSet<ServerAddress> {
        self.pools.read().keys().cloned().collect()
    }

    /// 주소 풀 존재 여부
    pub fn has_address(&self, address: &ServerAddress) -> bool {
        self.pools.read().contains_key(address)
    }

    /// 주소별 메트릭
    pub fn address_metrics(&self, address: &ServerAddress) -> Option<PoolMetrics> {
        self.pools.read().get(address).map(|pool| pool.metrics())
    }

    /// 전체 메트릭
    pub fn metrics(&self) -> PoolMetrics {
        self.pools
            .read()
            .values()
            .map(|pool| pool.metrics())
            .fold(PoolMetrics::default(), PoolMetrics::merge)
    }

    /// 주소 풀 수
    pub fn pool_count(&self) -> usize {
        self.pools.read().len()
    }

    fn get_or_create_pool(&self, address: &ServerAddress) -> Arc<AddressPool> {
        // 읽기 락으로 먼저 확인
        {
            let pools = self.pools.read();
            if let Some(pool) = pools.get(address) {
                return pool.clone();
            }
        }

        // 쓰기 락으로 생성
        let mut pools = self.pools.write();
        pools
            .entry(address.clone())
            .or_insert_with(|| Arc::new(AddressPool::new(address.clone(), self.config.clone())))
            .clone()
    }

    fn remove_if_empty(&self, address: &ServerAddress, pool: &Arc<AddressPool>) {
        let mut pools = self.pools.write();
        let is_same = pools.get(address).is_some_and(|p| Arc::ptr_eq(p, pool));
        if is_same && pool.size.load(Ordering::Relaxed) == 0 {
            pools.remove(address);
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("addresses", &self.pools.read().len())
            .field("open", &*self.open.read())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
