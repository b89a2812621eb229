//! Line-oriented reading of process output streams.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Read `reader` to EOF, calling `on_line` once per line.
///
/// Lines are split on `\n` with a trailing `\r` removed; invalid UTF-8 is
/// replaced rather than aborting the stream. A final line without a
/// terminating newline is still delivered.
///
/// # Errors
/// Returns the underlying read error; lines read before it were delivered.
pub async fn pump_lines<R, F>(reader: R, mut on_line: F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        on_line(String::from_utf8_lossy(&buf).into_owned());
    }
}
