//! 协议常量定义

use std::time::Duration;

/// 命令关键字: 客户端发送聊天消息
pub const KEYWORD_SEND: &str = "SEND";

/// 命令关键字: 客户端设置昵称
pub const KEYWORD_NAME: &str = "NAME";

/// 命令关键字: 服务端转发聊天消息
pub const KEYWORD_MESSAGE: &str = "MESSAGE";

/// 默认服务地址
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// 昵称最大长度（字节）
pub const MAX_NAME_LEN: usize = 32;

/// 单条消息最大长度（字节）
pub const MAX_MESSAGE_LEN: usize = 4096;

/// 单行最大长度（不含换行符）
pub const MAX_LINE_LEN: usize = 8192;

/// 每个连接的发送队列容量
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 单次写入超时（秒）- 超过此时间视为对端卡死
pub const WRITE_TIMEOUT_SECS: u64 = 10;

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);

/// 写入超时 Duration
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(WRITE_TIMEOUT_SECS);
