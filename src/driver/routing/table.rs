//! 라우팅 테이블
//!
//! 클러스터의 서버 역할별 목록을 관리합니다.
//!
//! 테이블은 한 번 만들어지면 수정되지 않습니다. 주소 제거는 새 테이블을
//! 반환하며, 라운드 로빈 커서만 원자적으로 움직입니다.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use super::super::driver::ServerAddress;
use super::discovery::RoutingInfo;

/// 서버 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerRole {
    /// 라우팅 테이블 제공자
    Route,
    /// 쓰기 트랜잭션 처리 (리더)
    Write,
    /// 읽기 트랜잭션 처리 (팔로워)
    Read,
}

impl ServerRole {
    /// 문자열에서 역할 파싱
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ROUTE" => Some(Self::Route),
            "WRITE" => Some(Self::Write),
            "READ" => Some(Self::Read),
            _ => None,
        }
    }

    /// 역할을 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Route => "ROUTE",
            Self::Write => "WRITE",
            Self::Read => "READ",
        }
    }
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 접근 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    /// 읽기 (리더로 라우팅)
    #[default]
    Read,
    /// 쓰기 (라이터로 라우팅)
    Write,
}

impl AccessMode {
    /// 모드가 사용하는 서버 역할
    pub fn role(&self) -> ServerRole {
        match self {
            Self::Read => ServerRole::Read,
            Self::Write => ServerRole::Write,
        }
    }

    /// 소문자 이름 (에러 메시지용)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// 라우팅 테이블
pub struct RoutingTable {
    /// 라우터 목록 (라우팅 테이블 조회용)
    routers: Vec<ServerAddress>,
    /// 리더 목록 (읽기 트랜잭션용)
    readers: Vec<ServerAddress>,
    /// 라이터 목록 (쓰기 트랜잭션용)
    writers: Vec<ServerAddress>,
    /// TTL
    ttl: Duration,
    /// 생성 시간
    updated_at: Instant,
    router_index: AtomicUsize,
    reader_index: AtomicUsize,
    writer_index: AtomicUsize,
}

impl RoutingTable {
    /// 초기 라우터로 테이블 생성
    ///
    /// 리더와 라이터가 비어 있고 이미 만료된 상태이므로 첫 사용 시
    /// 디스커버리가 실행됩니다.
    pub fn seed(routers: Vec<ServerAddress>) -> Self {
        Self::with_lists(routers, Vec::new(), Vec::new(), Duration::ZERO)
    }

    /// 디스커버리 결과로 테이블 생성
    pub fn from_routing_info(info: RoutingInfo) -> Self {
        Self::with_lists(
            info.routers,
            info.readers,
            info.writers,
            Duration::from_secs(info.ttl),
        )
    }

    fn with_lists(
        routers: Vec<ServerAddress>,
        readers: Vec<ServerAddress>,
        writers: Vec<ServerAddress>,
        ttl: Duration,
    ) -> Self {
        Self {
            routers,
            readers,
            writers,
            ttl,
            updated_at: Instant::now(),
            router_index: AtomicUsize::new(0),
            reader_index: AtomicUsize::new(0),
            writer_index: AtomicUsize::new(0),
        }
    }

    /// 라우터 목록
    pub fn routers(&self) -> &[ServerAddress] {
        &self.routers
    }

    /// 리더 목록
    pub fn readers(&self) -> &[ServerAddress] {
        &self.readers
    }

    /// 라이터 목록
    pub fn writers(&self) -> &[ServerAddress] {
        &self.writers
    }

    /// 접근 모드에 해당하는 서버 목록
    pub fn servers_for(&self, mode: AccessMode) -> &[ServerAddress] {
        match mode {
            AccessMode::Read => &self.readers,
            AccessMode::Write => &self.writers,
        }
    }

    /// TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 다음 라우터
    pub fn next_router(&self) -> Option<ServerAddress> {
        next(&self.routers, &self.router_index)
    }

    /// 다음 리더
    pub fn next_reader(&self) -> Option<ServerAddress> {
        next(&self.readers, &self.reader_index)
    }

    /// 다음 라이터
    pub fn next_writer(&self) -> Option<ServerAddress> {
        next(&self.writers, &self.writer_index)
    }

    /// 접근 모드에 따라 다음 서버 선택
    pub fn next_for(&self, mode: AccessMode) -> Option<ServerAddress> {
        match mode {
            AccessMode::Read => self.next_reader(),
            AccessMode::Write => self.next_writer(),
        }
    }

    /// 라우팅 테이블이 만료되었는지 확인
    pub fn is_expired(&self) -> bool {
        self.updated_at.elapsed() >= self.ttl
    }

    /// 주어진 접근 모드로 사용하기에 부족한지 확인
    pub fn is_stale_for(&self, mode: AccessMode) -> bool {
        self.is_expired() || self.routers.is_empty() || self.servers_for(mode).is_empty()
    }

    /// 주소를 모든 역할에서 뺀 새 테이블
    pub fn remove(&self, address: &ServerAddress) -> Self {
        self.derive(
            without(&self.routers, address),
            without(&self.readers, address),
            without(&self.writers, address),
        )
    }

    /// 주소를 라이터 역할에서만 뺀 새 테이블
    pub fn remove_writer(&self, address: &ServerAddress) -> Self {
        self.derive(
            self.routers.clone(),
            self.readers.clone(),
            without(&self.writers, address),
        )
    }

    /// 모든 역할의 주소 합집합
    pub fn all(&self) -> HashSet<ServerAddress> {
        self.routers
            .iter()
            .chain(self.readers.iter())
            .chain(self.writers.iter())
            .cloned()
            .collect()
    }

    /// 만료 시각과 커서를 유지한 채 목록만 바꾼 테이블
    fn derive(
        &self,
        routers: Vec<ServerAddress>,
        readers: Vec<ServerAddress>,
        writers: Vec<ServerAddress>,
    ) -> Self {
        Self {
            routers,
            readers,
            writers,
            ttl: self.ttl,
            updated_at: self.updated_at,
            router_index: AtomicUsize::new(self.router_index.load(Ordering::Relaxed)),
            reader_index: AtomicUsize::new(self.reader_index.load(Ordering::Relaxed)),
            writer_index: AtomicUsize::new(self.writer_index.load(Ordering::Relaxed)),
        }
    }
}

fn next(servers: &[ServerAddress], index: &AtomicUsize) -> Option<ServerAddress> {
    if servers.is_empty() {
        return None;
    }
    let i = index.fetch_add(1, Ordering::Relaxed);
    Some(servers[i % servers.len()].clone())
}

fn without(servers: &[ServerAddress], address: &ServerAddress) -> Vec<ServerAddress> {
    servers.iter().filter(|a| *a != address).cloned().collect()
}

impl Clone for RoutingTable {
    fn clone(&self) -> Self {
        self.derive(
            self.routers.clone(),
            self.readers.clone(),
            self.writers.clone(),
        )
    }
}

impl fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingTable")
            .field("routers", &self.routers)
            .field("readers", &self.readers)
            .field("writers", &self.writers)
            .field("ttl", &self.ttl)
            .field("expired", &self.is_expired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::addrs;

    fn table(routers: &[&str], readers: &[&str], writers: &[&str]) -> RoutingTable {
        RoutingTable::from_routing_info(RoutingInfo {
            ttl: 300,
            routers: addrs(routers),
            readers: addrs(readers),
            writers: addrs(writers),
        })
    }

    #[test]
    fn test_server_role_parse() {
        assert_eq!(ServerRole::parse("ROUTE"), Some(ServerRole::Route));
        assert_eq!(ServerRole::parse("route"), Some(ServerRole::Route));
        assert_eq!(ServerRole::parse("WRITE"), Some(ServerRole::Write));
        assert_eq!(ServerRole::parse("READ"), Some(ServerRole::Read));
        assert_eq!(ServerRole::parse("UNKNOWN"), None);
        assert_eq!(ServerRole::Write.to_string(), "WRITE");
    }

    #[test]
    fn test_access_mode() {
        assert_eq!(AccessMode::default(), AccessMode::Read);
        assert_eq!(AccessMode::Read.role(), ServerRole::Read);
        assert_eq!(AccessMode::Write.as_str(), "write");
    }

    #[test]
    fn test_seed_table_is_stale() {
        let table = RoutingTable::seed(addrs(&["seed:7687"]));

        assert_eq!(table.routers(), addrs(&["seed:7687"]).as_slice());
        assert!(table.readers().is_empty());
        assert!(table.writers().is_empty());
        assert!(table.is_expired());
        assert!(table.is_stale_for(AccessMode::Read));
        assert!(table.is_stale_for(AccessMode::Write));
    }

    #[test]
    fn test_fresh_table() {
        let t = table(&["r1:7687"], &["s1:7687"], &[]);

        assert!(!t.is_expired());
        assert!(!t.is_stale_for(AccessMode::Read));
        // 라이터가 없으면 쓰기에는 부족
        assert!(t.is_stale_for(AccessMode::Write));
        assert!(!t.is_stale_for(AccessMode::Read));
    }

    #[test]
    fn test_zero_ttl_is_expired() {
        let t = RoutingTable::from_routing_info(RoutingInfo {
            ttl: 0,
            routers: addrs(&["r1:7687"]),
            readers: addrs(&["s1:7687"]),
            writers: addrs(&["w1:7687"]),
        });
        assert!(t.is_expired());
        assert!(t.is_stale_for(AccessMode::Read));
    }

    #[test]
    fn test_round_robin_selection() {
        let t = table(&["r1:7687"], &["s1:7687", "s2:7687", "s3:7687"], &["w1:7687"]);
        let expected = addrs(&["s1:7687", "s2:7687", "s3:7687", "s1:7687"]);

        let picked: Vec<ServerAddress> = (0..4).filter_map(|_| t.next_reader()).collect();
        assert_eq!(picked, expected);

        assert_eq!(t.next_writer(), Some(ServerAddress::new("w1", 7687)));
        assert_eq!(t.next_writer(), Some(ServerAddress::new("w1", 7687)));
        assert_eq!(t.next_for(AccessMode::Read), Some(ServerAddress::new("s2", 7687)));
    }

    #[test]
    fn test_empty_role_has_no_next() {
        let t = table(&[], &[], &[]);
        assert_eq!(t.next_router(), None);
        assert_eq!(t.next_reader(), None);
        assert_eq!(t.next_writer(), None);
        assert_eq!(t.next_for(AccessMode::Write), None);
    }

    #[test]
    fn test_remove_returns_new_table() {
        let t = table(&["a:7687", "b:7687"], &["a:7687", "c:7687"], &["a:7687"]);
        let a = ServerAddress::new("a", 7687);

        let removed = t.remove(&a);
        assert!(!removed.all().contains(&a));
        assert_eq!(removed.routers(), addrs(&["b:7687"]).as_slice());
        assert_eq!(removed.readers(), addrs(&["c:7687"]).as_slice());
        assert!(removed.writers().is_empty());

        // 원본은 그대로
        assert!(t.all().contains(&a));
        assert_eq!(t.writers().len(), 1);

        // 없는 주소 제거는 실패하지 않음
        let same = t.remove(&ServerAddress::new("zzz", 1));
        assert_eq!(same.all(), t.all());
    }

    #[test]
    fn test_remove_writer_keeps_other_roles() {
        let t = table(&["a:7687"], &["a:7687", "b:7687"], &["a:7687", "b:7687"]);
        let a = ServerAddress::new("a", 7687);

        let demoted = t.remove_writer(&a);
        assert_eq!(demoted.writers(), addrs(&["b:7687"]).as_slice());
        assert!(demoted.readers().contains(&a));
        assert!(demoted.routers().contains(&a));
    }

    #[test]
    fn test_remove_carries_cursor() {
        let t = table(&["r:7687"], &["s1:7687", "s2:7687", "s3:7687"], &[]);
        assert_eq!(t.next_reader(), Some(ServerAddress::new("s1", 7687)));
        assert_eq!(t.next_reader(), Some(ServerAddress::new("s2", 7687)));

        let t = t.remove(&ServerAddress::new("s2", 7687));
        // 커서 2, 남은 목록 [s1, s3]
        assert_eq!(t.next_reader(), Some(ServerAddress::new("s1", 7687)));
        assert_eq!(t.next_reader(), Some(ServerAddress::new("s3", 7687)));
    }

    #[test]
    fn test_all_is_union() {
        let t = table(&["a:1"], &["a:1", "b:1"], &["c:1"]);
        let all = t.all();
        assert_eq!(all.len(), 3);
        for address in addrs(&["a:1", "b:1", "c:1"]) {
            assert!(all.contains(&address));
        }
    }
}
