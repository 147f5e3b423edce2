//! Transport
//!
//! 라우팅 코어가 의존하는 전송 계층 인터페이스.
//!
//! Bolt 핸드셰이크, 프레이밍, 인증은 이 트레이트의 구현체가 담당합니다.
//! 라우팅 코어는 주소로 연결을 열고 요청/응답을 주고받는 것만 알면 됩니다.
//!
//! # 에러 규약
//!
//! - 연결을 만들 수 없거나 사용 중 끊어지면 [`DriverError::Connection`]
//!   (또는 [`DriverError::Io`])을 반환합니다.
//! - 서버가 FAILURE로 응답하면 [`DriverError::Server`]를 반환합니다.
//!
//! [`DriverError::Connection`]: super::error::DriverError::Connection
//! [`DriverError::Io`]: super::error::DriverError::Io
//! [`DriverError::Server`]: super::error::DriverError::Server

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use super::driver::ServerAddress;
use super::error::DriverResult;
use super::types::{Record, Value};

/// 원시 연결 팩토리
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// 주소로 새 연결 열기
    async fn open(&self, address: &ServerAddress) -> DriverResult<Box<dyn RawConnection>>;
}

/// 전송 계층의 단일 연결
#[async_trait]
pub trait RawConnection: Send + Sync + fmt::Debug {
    /// 쿼리 실행 후 모든 레코드 수신
    async fn run(
        &mut self,
        query: &str,
        parameters: HashMap<String, Value>,
    ) -> DriverResult<Vec<Record>>;

    /// 연결 상태 초기화
    async fn reset(&mut self) -> DriverResult<()>;

    /// 연결이 아직 사용 가능한지
    fn is_open(&self) -> bool;

    /// 연결 닫기
    async fn close(&mut self);
}
