//! M9.1: Driver
//!
//! 서버 주소 및 드라이버 설정

use std::fmt;
use std::time::Duration;

use super::error::{DriverError, DriverResult};
use super::pool::PoolConfig;
use super::routing::GET_SERVERS_PROCEDURE;

/// 기본 Bolt 포트
pub const DEFAULT_PORT: u16 = 7687;

/// 지원하는 URI 스킴 (긴 접두사 먼저)
const SCHEMES: [&str; 6] = [
    "zeta4g+ssc://",
    "zeta4g+s://",
    "zeta4g://",
    "bolt+ssc://",
    "bolt+s://",
    "bolt://",
];

/// URI에서 스킴 제거
pub(crate) fn strip_scheme(uri: &str) -> &str {
    SCHEMES
        .iter()
        .find_map(|scheme| uri.strip_prefix(scheme))
        .unwrap_or(uri)
}

// ============================================================================
// ServerAddress - 서버 주소
// ============================================================================

/// 서버 주소
///
/// 클러스터 멤버를 식별하는 값 타입입니다. 디스커버리 응답이나 설정에서
/// 만들어지며 이후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerAddress {
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
}

impl ServerAddress {
    /// 새 서버 주소 생성
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host`, `host:port`, `[ipv6]:port` 형식 파싱
    pub fn parse(s: &str) -> DriverResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DriverError::configuration("Empty server address"));
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| DriverError::configuration(format!("Invalid server address: {}", s)))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port)?,
                None if tail.is_empty() => DEFAULT_PORT,
                None => {
                    return Err(DriverError::configuration(format!(
                        "Invalid server address: {}",
                        s
                    )))
                }
            };
            return Ok(Self::new(host, port));
        }

        let (host, port) = match s.split_once(':') {
            None => (s, DEFAULT_PORT),
            Some((host, port)) => (host, parse_port(port)?),
        };

        if host.is_empty() {
            return Err(DriverError::configuration(format!("Invalid server address: {}", s)));
        }

        Ok(Self::new(host, port))
    }

    /// URI에서 파싱
    pub fn from_uri(uri: &str) -> DriverResult<Self> {
        Self::parse(strip_scheme(uri).trim_end_matches('/'))
    }

    /// 소켓 주소로 변환
    pub fn to_socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn parse_port(port: &str) -> DriverResult<u16> {
    port.parse()
        .map_err(|_| DriverError::configuration(format!("Invalid port: {}", port)))
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_socket_addr())
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

// ============================================================================
// DriverConfig - 드라이버 설정
// ============================================================================

/// 드라이버 설정
///
/// 라우팅 코어는 이 설정을 소비만 합니다. 파일이나 환경 변수에서 읽는 일은
/// 상위 계층이 담당합니다.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// 초기 라우터 주소 (시드)
    pub routers: Vec<ServerAddress>,
    /// 주소별 연결 풀 최대 크기
    pub max_connection_pool_size: usize,
    /// 연결 획득 타임아웃
    pub connection_acquisition_timeout: Duration,
    /// 연결 타임아웃
    pub connection_timeout: Duration,
    /// 연결 최대 수명
    pub max_connection_lifetime: Duration,
    /// 유휴 타임아웃
    pub idle_timeout: Duration,
    /// 디스커버리 프로시저
    pub routing_procedure: String,
}

impl DriverConfig {
    /// 새 설정 생성
    ///
    /// URI 형식: `zeta4g://host1:port1,host2:port2,...`
    pub fn new(uri: &str) -> DriverResult<Self> {
        let routers = parse_addresses(uri)?;

        Ok(Self {
            routers,
            ..Self::default()
        })
    }

    /// 빌더 시작
    pub fn builder(uri: &str) -> DriverResult<DriverConfigBuilder> {
        let config = Self::new(uri)?;
        Ok(DriverConfigBuilder { config })
    }

    /// 시드 라우터
    pub fn address(&self) -> Option<&ServerAddress> {
        self.routers.first()
    }

    /// 연결 풀 설정
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_size: self.max_connection_pool_size,
            max_lifetime: self.max_connection_lifetime,
            idle_timeout: self.idle_timeout,
            connection_timeout: self.connection_timeout,
            acquisition_timeout: self.connection_acquisition_timeout,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            routers: vec![ServerAddress::default()],
            max_connection_pool_size: 100,
            connection_acquisition_timeout: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(30),
            max_connection_lifetime: Duration::from_secs(3600),
            idle_timeout: Duration::from_secs(300),
            routing_procedure: GET_SERVERS_PROCEDURE.to_string(),
        }
    }
}

/// URI에서 쉼표로 구분된 주소 목록 파싱
pub(crate) fn parse_addresses(uri: &str) -> DriverResult<Vec<ServerAddress>> {
    let routers = strip_scheme(uri)
        .trim_end_matches('/')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ServerAddress::parse)
        .collect::<DriverResult<Vec<_>>>()?;

    if routers.is_empty() {
        return Err(DriverError::configuration("No routers specified"));
    }

    Ok(routers)
}

// ============================================================================
// DriverConfigBuilder - 설정 빌더
// ============================================================================

/// 드라이버 설정 빌더
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// 연결 풀 크기 설정
    pub fn with_max_connection_pool_size(mut self, size: usize) -> Self {
        self.config.max_connection_pool_size = size;
        self
    }

    /// 연결 획득 타임아웃 설정
    pub fn with_connection_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_acquisition_timeout = timeout;
        self
    }

    /// 연결 타임아웃 설정
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// 연결 최대 수명 설정
    pub fn with_max_connection_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.max_connection_lifetime = lifetime;
        self
    }

    /// 유휴 타임아웃 설정
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// 디스커버리 프로시저 설정
    pub fn with_routing_procedure(mut self, procedure: impl Into<String>) -> Self {
        self.config.routing_procedure = procedure.into();
        self
    }

    /// 빌드
    pub fn build(self) -> DriverConfig {
        self.config
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_address() {
        let addr = ServerAddress::new("localhost", 7687);
        assert_eq!(addr.host, "localhost");
        assert_eq!(addr.port, 7687);
        assert_eq!(addr.to_string(), "localhost:7687");
    }

    #[test]
    fn test_server_address_parse() {
        assert_eq!(
            ServerAddress::parse("core1:7688").unwrap(),
            ServerAddress::new("core1", 7688)
        );
        assert_eq!(
            ServerAddress::parse("core1").unwrap(),
            ServerAddress::new("core1", DEFAULT_PORT)
        );
        assert_eq!(
            ServerAddress::parse("[::1]:9000").unwrap(),
            ServerAddress::new("::1", 9000)
        );
        assert_eq!(ServerAddress::new("::1", 9000).to_string(), "[::1]:9000");

        assert!(ServerAddress::parse("").is_err());
        assert!(ServerAddress::parse(":7687").is_err());
        assert!(ServerAddress::parse("host:port").is_err());
        assert!(ServerAddress::parse("a:1:2").is_err());
        assert!(ServerAddress::parse("[::1").is_err());
    }

    #[test]
    fn test_server_address_from_uri() {
        let addr = ServerAddress::from_uri("bolt://localhost:7687").unwrap();
        assert_eq!(addr, ServerAddress::new("localhost", 7687));

        let addr = ServerAddress::from_uri("zeta4g://example.com:7688").unwrap();
        assert_eq!(addr, ServerAddress::new("example.com", 7688));

        let addr = ServerAddress::from_uri("zeta4g+s://secure.example.com").unwrap();
        assert_eq!(addr, ServerAddress::new("secure.example.com", DEFAULT_PORT));
    }

    #[test]
    fn test_server_address_is_map_key() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(ServerAddress::new("a", 1));
        set.insert(ServerAddress::new("a", 1));
        set.insert(ServerAddress::new("a", 2));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_driver_config() {
        let config = DriverConfig::new("zeta4g://server1:7687,server2:7688").unwrap();

        assert_eq!(
            config.routers,
            vec![ServerAddress::new("server1", 7687), ServerAddress::new("server2", 7688)]
        );
        assert_eq!(config.address(), Some(&ServerAddress::new("server1", 7687)));
        assert_eq!(config.max_connection_pool_size, 100);
        assert_eq!(config.routing_procedure, GET_SERVERS_PROCEDURE);
    }

    #[test]
    fn test_driver_config_secure_schemes() {
        // TLS는 전송 계층 몫, 스킴은 주소만 벗겨냄
        let config = DriverConfig::new("zeta4g+s://localhost:7687").unwrap();
        assert_eq!(config.routers, vec![ServerAddress::new("localhost", 7687)]);

        let config = DriverConfig::new("bolt+ssc://a:1,b:2").unwrap();
        assert_eq!(config.routers.len(), 2);
    }

    #[test]
    fn test_driver_config_no_routers() {
        assert!(DriverConfig::new("zeta4g://").is_err());
        assert!(DriverConfig::new("zeta4g://,,").is_err());
    }

    #[test]
    fn test_driver_config_builder() {
        let config = DriverConfig::builder("zeta4g://localhost:7687")
            .unwrap()
            .with_max_connection_pool_size(5)
            .with_connection_timeout(Duration::from_secs(3))
            .with_connection_acquisition_timeout(Duration::from_secs(4))
            .with_max_connection_lifetime(Duration::from_secs(600))
            .with_idle_timeout(Duration::from_secs(60))
            .with_routing_procedure("CALL custom.routing()")
            .build();

        let pool = config.pool_config();
        assert_eq!(pool.max_size, 5);
        assert_eq!(pool.connection_timeout, Duration::from_secs(3));
        assert_eq!(pool.acquisition_timeout, Duration::from_secs(4));
        assert_eq!(pool.max_lifetime, Duration::from_secs(600));
        assert_eq!(pool.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.routing_procedure, "CALL custom.routing()");
    }
}
