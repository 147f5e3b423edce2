//! 클러스터 디스커버리
//!
//! 라우터 연결에서 라우팅 프로시저를 호출하고 응답을 [`RoutingInfo`]로 해석합니다.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::super::driver::ServerAddress;
use super::super::error::{codes, DriverError, DriverResult};
use super::super::pool::PooledConnection;
use super::super::types::{Record, Value};
use super::table::ServerRole;

/// 기본 라우팅 프로시저
pub const GET_SERVERS_PROCEDURE: &str = "CALL dbms.cluster.routing.getServers";

/// 디스커버리 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingInfo {
    /// TTL (초)
    pub ttl: u64,
    /// 라우터 주소
    pub routers: Vec<ServerAddress>,
    /// 리더 주소
    pub readers: Vec<ServerAddress>,
    /// 라이터 주소
    pub writers: Vec<ServerAddress>,
}

impl RoutingInfo {
    /// `{ttl, servers: [{role, addresses}]}` 레코드 해석
    pub fn from_record(record: &Record) -> DriverResult<Self> {
        let ttl = record
            .get("ttl")
            .and_then(Value::as_int)
            .ok_or_else(|| DriverError::invalid_discovery("Missing or invalid 'ttl' field"))?;

        let servers = record
            .get("servers")
            .and_then(Value::as_list)
            .ok_or_else(|| DriverError::invalid_discovery("Missing or invalid 'servers' field"))?;

        let mut info = RoutingInfo {
            ttl: u64::try_from(ttl).unwrap_or(0),
            ..Default::default()
        };

        for server in servers {
            let server = server
                .as_map()
                .ok_or_else(|| DriverError::invalid_discovery("Server entry is not a map"))?;

            let role = server
                .get("role")
                .and_then(Value::as_str)
                .ok_or_else(|| DriverError::invalid_discovery("Server entry has no role"))?;
            let role = ServerRole::parse(role).ok_or_else(|| {
                DriverError::invalid_discovery(format!("Unknown server role '{}'", role))
            })?;

            let addresses = parse_addresses(server)?;
            match role {
                ServerRole::Route => info.routers.extend(addresses),
                ServerRole::Read => info.readers.extend(addresses),
                ServerRole::Write => info.writers.extend(addresses),
            }
        }

        if info.routers.is_empty() {
            return Err(DriverError::invalid_discovery("No routing servers available"));
        }
        if info.readers.is_empty() {
            return Err(DriverError::invalid_discovery("No read servers available"));
        }

        Ok(info)
    }
}

fn parse_addresses(server: &HashMap<String, Value>) -> DriverResult<Vec<ServerAddress>> {
    let addresses = server
        .get("addresses")
        .and_then(Value::as_list)
        .ok_or_else(|| DriverError::invalid_discovery("Server entry has no addresses"))?;

    addresses
        .iter()
        .map(|address| {
            let s = address
                .as_str()
                .ok_or_else(|| DriverError::invalid_discovery("Address is not a string"))?;
            ServerAddress::parse(s).map_err(|e| {
                DriverError::invalid_discovery(format!("Invalid address '{}': {}", s, e))
            })
        })
        .collect()
}

/// 디스커버리 관리자
#[derive(Debug, Clone)]
pub struct DiscoveryManager {
    procedure: String,
}

impl Default for DiscoveryManager {
    fn default() -> Self {
        Self::new(GET_SERVERS_PROCEDURE)
    }
}

impl DiscoveryManager {
    /// 프로시저를 지정해 생성
    pub fn new(procedure: impl Into<String>) -> Self {
        Self {
            procedure: procedure.into(),
        }
    }

    /// 호출할 프로시저
    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    /// 한 번의 디스커버리 실행
    ///
    /// - 연결이 끊기면 [`DriverError::SessionExpired`]
    /// - 프로시저가 없거나 응답이 잘못되면 [`DriverError::InvalidDiscovery`]
    /// - 그 밖의 서버 에러는 그대로 전달
    pub async fn discover(&self, conn: &mut PooledConnection) -> DriverResult<RoutingInfo> {
        let address = conn.address().clone();
        debug!(%address, procedure = %self.procedure, "running discovery");

        let records = match conn.run(&self.procedure, HashMap::new()).await {
            Ok(records) => records,
            Err(err) if err.is_connection_error() => {
                warn!(%address, error = %err, "connection lost during discovery");
                return Err(DriverError::session_expired(format!(
                    "Server at {} is no longer available: {}",
                    address, err
                )));
            }
            Err(err) if err.server_code() == Some(codes::PROCEDURE_NOT_FOUND) => {
                return Err(DriverError::invalid_discovery(format!(
                    "Server at {} can not perform routing: {}",
                    address, err
                )));
            }
            Err(err) => return Err(err),
        };

        let record = records.first().ok_or_else(|| {
            DriverError::invalid_discovery(format!("No routing record returned by {}", address))
        })?;
        let info = RoutingInfo::from_record(record)?;

        debug!(
            %address,
            ttl = info.ttl,
            routers = info.routers.len(),
            readers = info.readers.len(),
            writers = info.writers.len(),
            "discovery succeeded"
        );
        Ok(info)
    }
}
