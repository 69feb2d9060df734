//! 命令编解码
//!
//! 行格式（每条命令以 `\n` 结尾，字段原样写入，不做转义）:
//! ```text
//! SEND <message>\n
//! NAME <name>\n
//! MESSAGE <name> <message>\n
//! ```

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::message::Command;
use crate::{KEYWORD_MESSAGE, KEYWORD_NAME, KEYWORD_SEND, MAX_LINE_LEN};

/// 将命令编码为一行文本（含结尾换行）
pub fn encode(command: &Command) -> Result<String> {
    command.validate()?;
    let line = match command {
        Command::Send { message } => format!("{KEYWORD_SEND} {message}\n"),
        Command::Name { name } => format!("{KEYWORD_NAME} {name}\n"),
        Command::Message { name, message } => format!("{KEYWORD_MESSAGE} {name} {message}\n"),
    };
    Ok(line)
}

/// 解码一行（不含结尾换行）
pub fn decode_line(line: &[u8]) -> Result<Command> {
    let line = std::str::from_utf8(line)?;

    // 关键字以第一个空格结束，没有空格的行无法识别
    let Some((keyword, rest)) = line.split_once(' ') else {
        return Err(ProtocolError::UnknownCommand(line.to_string()));
    };

    match keyword {
        KEYWORD_SEND => Ok(Command::Send {
            message: rest.to_string(),
        }),
        KEYWORD_NAME => Ok(Command::Name {
            name: rest.to_string(),
        }),
        KEYWORD_MESSAGE => {
            let (name, message) = rest.split_once(' ').ok_or(ProtocolError::MalformedCommand {
                keyword: KEYWORD_MESSAGE,
                reason: "missing message field",
            })?;
            Ok(Command::Message {
                name: name.to_string(),
                message: message.to_string(),
            })
        }
        other => Err(ProtocolError::UnknownCommand(other.to_string())),
    }
}

fn map_read_error(e: std::io::Error) -> ProtocolError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::ConnectionClosed
    } else {
        ProtocolError::Io(e)
    }
}

/// 命令读取器
pub struct CommandReader<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
    max_line_len: usize,
}

impl<R: AsyncRead + Unpin> CommandReader<R> {
    /// 创建新的命令读取器
    pub fn new(reader: R) -> Self {
        Self::with_max_line_len(reader, MAX_LINE_LEN)
    }

    /// 指定单行长度上限
    pub fn with_max_line_len(reader: R, max_line_len: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: Vec::with_capacity(256),
            max_line_len,
        }
    }

    /// 读取并解码一条命令
    ///
    /// 总是先读完整行再解析，未知命令只会丢弃所在的这一行。
    /// 流在记录中途关闭时返回 `ConnectionClosed`，不会返回残缺命令。
    pub async fn read_command(&mut self) -> Result<Command> {
        self.line.clear();

        // 多读一个字节用于判断是否超长
        let limit = self.max_line_len as u64 + 1;
        let n = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.line)
            .await
            .map_err(map_read_error)?;

        if n == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }

        if self.line.last() != Some(&b'\n') {
            if self.line.len() as u64 >= limit {
                debug!("Discarding line longer than {} bytes", self.max_line_len);
                self.discard_line().await?;
                return Err(ProtocolError::LineTooLong {
                    max: self.max_line_len,
                });
            }
            return Err(ProtocolError::ConnectionClosed);
        }

        self.line.pop();
        decode_line(&self.line)
    }

    /// 丢弃当前行剩余部分（含换行符）
    async fn discard_line(&mut self) -> Result<()> {
        loop {
            let (found, len) = {
                let buf = self.reader.fill_buf().await.map_err(map_read_error)?;
                if buf.is_empty() {
                    return Err(ProtocolError::ConnectionClosed);
                }
                match buf.iter().position(|&b| b == b'\n') {
                    Some(pos) => (true, pos + 1),
                    None => (false, buf.len()),
                }
            };
            self.reader.consume(len);
            if found {
                return Ok(());
            }
        }
    }
}

/// 命令写入器
pub struct CommandWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> CommandWriter<W> {
    /// 创建新的命令写入器
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// 编码并写入一条命令
    pub async fn write_command(&mut self, command: &Command) -> Result<()> {
        let line = encode(command)?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// 关闭写入端
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
