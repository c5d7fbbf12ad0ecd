use thiserror::Error;

/// 用户可见的失败分类，映射到应答中的 errno。
/// User-visible failure taxonomy, mapped to the wire errno.
///
/// 单个处理器或单个接收者的失败从不关闭连接或进程。
/// A failure local to one handler or one recipient never tears down the
/// connection or the process.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid id or password")]
    Auth,
    #[error("account already logged in")]
    AlreadyLoggedIn,
    #[error("registration rejected")]
    Registration,
    #[error("group operation rejected")]
    GroupRejected,
    #[error("malformed request")]
    Malformed,
}

impl ServiceError {
    /// errno 约定：0 成功，2 重复登录，其余失败为 1。
    /// errno convention: 0 success, 2 duplicate login, 1 for the rest.
    pub fn errno(&self) -> i64 {
        match self {
            ServiceError::AlreadyLoggedIn => 2,
            _ => 1,
        }
    }
}
