//! 错误类型定义

use thiserror::Error;

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,

    /// 未知命令关键字
    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),

    /// 关键字正确但缺少字段
    #[error("Malformed {keyword} command: {reason}")]
    MalformedCommand {
        keyword: &'static str,
        reason: &'static str,
    },

    /// 非 UTF-8 内容
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// 单行超长
    #[error("Line too long (max: {max} bytes)")]
    LineTooLong { max: usize },

    /// 字段包含分隔符等非法内容
    #[error("Invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },

    /// 昵称过长
    #[error("Name too long: {len} bytes (max: {max})")]
    NameTooLong { len: usize, max: usize },

    /// 消息过长
    #[error("Message too long: {len} bytes (max: {max})")]
    MessageTooLong { len: usize, max: usize },
}

impl ProtocolError {
    /// 对端发来的单行格式错误，丢弃该行后可以继续读取
    ///
    /// `InvalidField` 等发送方校验错误属于调用方的编程错误，不在此列。
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnknownCommand(_)
                | ProtocolError::MalformedCommand { .. }
                | ProtocolError::InvalidUtf8(_)
                | ProtocolError::LineTooLong { .. }
        )
    }
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(ProtocolError::UnknownCommand("HELLO".to_string()).is_recoverable());
        assert!(ProtocolError::LineTooLong { max: 10 }.is_recoverable());
        assert!(!ProtocolError::ConnectionClosed.is_recoverable());
        assert!(!ProtocolError::InvalidField {
            field: "name",
            reason: "contains a space",
        }
        .is_recoverable());
    }
}
