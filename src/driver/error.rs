//! Driver Error Types
//!
//! 라우팅 코어 에러 정의

use std::io;
use thiserror::Error;

// ============================================================================
// Server Error Codes
// ============================================================================

/// 라우팅 코어가 해석하는 서버 에러 코드
///
/// 에러 코드는 "Neo.{Category}.{SubCategory}.{ErrorType}" 형식을 따릅니다.
pub mod codes {
    /// 리더가 아닌 서버에 쓰기 요청
    pub const NOT_A_LEADER: &str = "Neo.ClientError.Cluster.NotALeader";
    /// 읽기 전용 서버에 쓰기 요청
    pub const FORBIDDEN_ON_READ_ONLY_DATABASE: &str =
        "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase";
    /// 프로시저 없음 (라우터가 아닌 서버)
    pub const PROCEDURE_NOT_FOUND: &str = "Neo.ClientError.Procedure.ProcedureNotFound";
    /// 트랜지언트 에러 접두사
    pub const TRANSIENT_ERROR_PREFIX: &str = "Neo.TransientError";
}

// ============================================================================
// DriverError - 드라이버 에러
// ============================================================================

/// 드라이버 에러
#[derive(Error, Debug)]
pub enum DriverError {
    /// 연결 에러 (연결 수립 실패 또는 연결 끊김)
    #[error("Connection error: {0}")]
    Connection(String),

    /// 세션 만료 (호출자가 다른 연결로 재시도해야 함)
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// 서버 사용 불가 (라우터에 도달할 수 없음)
    #[error("Server unavailable: {0}")]
    ServerUnavailable(String),

    /// 라우터가 아닌 서버에서의 디스커버리
    #[error("Invalid discovery: {0}")]
    InvalidDiscovery(String),

    /// 클라이언트 사용 오류
    #[error("Client error: {0}")]
    Client(String),

    /// 서버 에러
    #[error("Server error: {code} - {message}")]
    Server { code: String, message: String },

    /// 타임아웃 에러
    #[error("Timeout: {0}")]
    Timeout(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 세션 에러
    #[error("Session error: {0}")]
    Session(String),

    /// I/O 에러
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DriverError {
    /// 연결 에러 생성
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// 세션 만료 에러 생성
    pub fn session_expired(msg: impl Into<String>) -> Self {
        Self::SessionExpired(msg.into())
    }

    /// 서버 사용 불가 에러 생성
    pub fn server_unavailable(msg: impl Into<String>) -> Self {
        Self::ServerUnavailable(msg.into())
    }

    /// 디스커버리 에러 생성
    pub fn invalid_discovery(msg: impl Into<String>) -> Self {
        Self::InvalidDiscovery(msg.into())
    }

    /// 클라이언트 에러 생성
    pub fn client(msg: impl Into<String>) -> Self {
        Self::Client(msg.into())
    }

    /// 서버 에러 생성
    pub fn server(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Server {
            code: code.into(),
            message: message.into(),
        }
    }

    /// 타임아웃 에러 생성
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 세션 에러 생성
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// 전송 계층 에러 여부
    ///
    /// 다른 주소로 재시도하면 회복될 수 있는 에러입니다.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Io(_))
    }

    /// 서버가 보고한 에러 여부
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Server { .. })
    }

    /// 서버 에러 코드
    pub fn server_code(&self) -> Option<&str> {
        match self {
            Self::Server { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// 재시도 가능 여부
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_)
            | Self::Io(_)
            | Self::SessionExpired(_)
            | Self::Timeout(_) => true,
            Self::Server { code, .. } => code.starts_with(codes::TRANSIENT_ERROR_PREFIX),
            _ => false,
        }
    }

    /// 클라이언트 에러 여부
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Client(_) | Self::Configuration(_))
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// 드라이버 결과 타입
pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// Tests
// ============================================================================
