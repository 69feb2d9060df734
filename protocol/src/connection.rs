//! 连接封装
//!
//! 将传输层和命令编解码封装在一起。

use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{CommandReader, CommandWriter};
use crate::transport::Transport;

/// 连接封装
///
/// 读写两端分别由不同任务持有，所以只提供 `split`。
///
/// # Type Parameters
/// * `R` - 读取端类型
/// * `W` - 写入端类型
pub struct Connection<R, W> {
    reader: CommandReader<R>,
    writer: CommandWriter<W>,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> Connection<R, W> {
    /// 从传输层创建连接
    pub fn new<T: Transport<Reader = R, Writer = W>>(transport: T) -> Self {
        let (reader, writer) = transport.split();
        Self {
            reader: CommandReader::new(reader),
            writer: CommandWriter::new(writer),
        }
    }

    /// 分离为读取端和写入端
    pub fn split(self) -> (CommandReader<R>, CommandWriter<W>) {
        (self.reader, self.writer)
    }
}
