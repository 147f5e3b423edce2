//! 테스트용 모의 전송 계층
//!
//! 주소별로 도달 불가, 디스커버리 응답, 쿼리 실패를 스크립트로 지정하고
//! 연결 열기/닫기, 디스커버리 호출 횟수를 기록합니다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::driver::ServerAddress;
use super::error::{codes, DriverError, DriverResult};
use super::transport::{RawConnection, Transport};
use super::types::{Record, Value};

/// 주소 문자열 파싱
pub(crate) fn addr(s: &str) -> ServerAddress {
    ServerAddress::parse(s).unwrap()
}

/// 주소 목록 파싱
pub(crate) fn addrs(list: &[&str]) -> Vec<ServerAddress> {
    list.iter().map(|s| addr(s)).collect()
}

/// `getServers` 형식의 디스커버리 응답 생성
pub(crate) fn routing_records(
    ttl: i64,
    routers: &[&str],
    readers: &[&str],
    writers: &[&str],
) -> Vec<Record> {
    fn server(role: &str, list: &[&str]) -> Value {
        let mut map = HashMap::new();
        map.insert("role".to_string(), Value::from(role));
        map.insert("addresses".to_string(), Value::from(list.to_vec()));
        Value::Map(map)
    }

    let record: Record = vec![
        ("ttl", Value::Integer(ttl)),
        (
            "servers",
            Value::List(vec![
                server("WRITE", writers),
                server("READ", readers),
                server("ROUTE", routers),
            ]),
        ),
    ]
    .into_iter()
    .collect();

    vec![record]
}

/// 스크립트된 응답
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    /// 레코드 반환
    Records(Vec<Record>),
    /// 서버 FAILURE
    ServerFailure { code: String, message: String },
    /// 연결 끊김
    Disconnect,
}

impl Scripted {
    pub(crate) fn server_failure(code: &str, message: &str) -> Self {
        Self::ServerFailure {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    unreachable: HashSet<ServerAddress>,
    routing: HashMap<ServerAddress, Scripted>,
    failures: HashMap<ServerAddress, Scripted>,
    opened: HashMap<ServerAddress, usize>,
    closed: HashMap<ServerAddress, usize>,
    discoveries: usize,
    discovery_delay: Option<Duration>,
    open_delays: HashMap<ServerAddress, Duration>,
}

/// 모의 전송 계층
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set_unreachable(&self, address: &ServerAddress) {
        self.state.lock().unreachable.insert(address.clone());
    }

    pub(crate) fn set_reachable(&self, address: &ServerAddress) {
        self.state.lock().unreachable.remove(address);
    }

    pub(crate) fn set_routing(&self, router: &ServerAddress, reply: Scripted) {
        self.state.lock().routing.insert(router.clone(), reply);
    }

    pub(crate) fn set_routing_table(
        &self,
        router: &ServerAddress,
        ttl: i64,
        routers: &[&str],
        readers: &[&str],
        writers: &[&str],
    ) {
        self.set_routing(
            router,
            Scripted::Records(routing_records(ttl, routers, readers, writers)),
        );
    }

    pub(crate) fn fail_queries(&self, address: &ServerAddress, failure: Scripted) {
        self.state.lock().failures.insert(address.clone(), failure);
    }

    pub(crate) fn set_discovery_delay(&self, delay: Duration) {
        self.state.lock().discovery_delay = Some(delay);
    }

    /// 주소로의 연결 열기를 지연 (응답 없는 서버)
    pub(crate) fn set_open_delay(&self, address: &ServerAddress, delay: Duration) {
        self.state.lock().open_delays.insert(address.clone(), delay);
    }

    pub(crate) fn opened(&self, address: &ServerAddress) -> usize {
        self.state.lock().opened.get(address).copied().unwrap_or(0)
    }

    pub(crate) fn closed(&self, address: &ServerAddress) -> usize {
        self.state.lock().closed.get(address).copied().unwrap_or(0)
    }

    pub(crate) fn discoveries(&self) -> usize {
        self.state.lock().discoveries
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, address: &ServerAddress) -> DriverResult<Box<dyn RawConnection>> {
        let delay = self.state.lock().open_delays.get(address).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if state.unreachable.contains(address) {
            return Err(DriverError::connection(format!(
                "Connection refused: {}",
                address
            )));
        }
        *state.opened.entry(address.clone()).or_insert(0) += 1;

        Ok(Box::new(MockConnection {
            address: address.clone(),
            state: self.state.clone(),
            open: true,
        }))
    }
}

#[derive(Debug)]
struct MockConnection {
    address: ServerAddress,
    state: Arc<Mutex<MockState>>,
    open: bool,
}

#[async_trait]
impl RawConnection for MockConnection {
    async fn run(
        &mut self,
        query: &str,
        _parameters: HashMap<String, Value>,
    ) -> DriverResult<Vec<Record>> {
        if !self.open {
            return Err(DriverError::connection("Connection is closed"));
        }

        let is_discovery = query.starts_with("CALL dbms.cluster.routing");
        let (reply, delay) = {
            let mut state = self.state.lock();
            if is_discovery {
                state.discoveries += 1;
                let reply = state.routing.get(&self.address).cloned().unwrap_or_else(|| {
                    Scripted::server_failure(
                        codes::PROCEDURE_NOT_FOUND,
                        "There is no procedure with the name `dbms.cluster.routing.getServers`",
                    )
                });
                (reply, state.discovery_delay)
            } else {
                let reply = state
                    .failures
                    .get(&self.address)
                    .cloned()
                    .unwrap_or(Scripted::Records(Vec::new()));
                (reply, None)
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Scripted::Records(records) => Ok(records),
            Scripted::ServerFailure { code, message } => Err(DriverError::server(code, message)),
            Scripted::Disconnect => {
                self.open = false;
                Err(DriverError::connection("Connection reset by peer"))
            }
        }
    }

    async fn reset(&mut self) -> DriverResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(DriverError::connection("Connection is closed"))
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            *self.state.lock().closed.entry(self.address.clone()).or_insert(0) += 1;
        }
    }
}
