//! 命令类型定义

use crate::error::{ProtocolError, Result};
use crate::{KEYWORD_MESSAGE, KEYWORD_NAME, KEYWORD_SEND, MAX_MESSAGE_LEN, MAX_NAME_LEN};

/// 协议命令
///
/// `Send` 与 `Name` 由客户端发往服务端，`Message` 由服务端转发给客户端。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 发送聊天消息
    Send { message: String },
    /// 设置昵称
    Name { name: String },
    /// 某用户说了某句话
    Message { name: String, message: String },
}

impl Command {
    /// 线上关键字
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::Send { .. } => KEYWORD_SEND,
            Command::Name { .. } => KEYWORD_NAME,
            Command::Message { .. } => KEYWORD_MESSAGE,
        }
    }

    /// 校验字段内容是否符合约束
    ///
    /// 编码器不做转义，字段中出现分隔符会破坏分帧，必须在发送前拒绝。
    pub fn validate(&self) -> Result<()> {
        match self {
            Command::Send { message } => validate_message(message),
            Command::Name { name } => validate_name(name),
            Command::Message { name, message } => {
                validate_name(name)?;
                validate_message(message)
            }
        }
    }
}

/// 校验昵称: 不能包含空格或换行，且不超过 `MAX_NAME_LEN`
pub fn validate_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(ProtocolError::NameTooLong {
            len: name.len(),
            max: MAX_NAME_LEN,
        });
    }
    if name.contains(' ') {
        return Err(ProtocolError::InvalidField {
            field: "name",
            reason: "contains a space",
        });
    }
    if name.contains('\n') {
        return Err(ProtocolError::InvalidField {
            field: "name",
            reason: "contains a newline",
        });
    }
    Ok(())
}

/// 校验消息正文: 不能包含换行，且不超过 `MAX_MESSAGE_LEN`
pub fn validate_message(message: &str) -> Result<()> {
    if message.len() > MAX_MESSAGE_LEN {
        return Err(ProtocolError::MessageTooLong {
            len: message.len(),
            max: MAX_MESSAGE_LEN,
        });
    }
    if message.contains('\n') {
        return Err(ProtocolError::InvalidField {
            field: "message",
            reason: "contains a newline",
        });
    }
    Ok(())
}
