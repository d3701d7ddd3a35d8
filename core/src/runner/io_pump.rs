use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

use crate::error::RunnerError;
use crate::util::RingLines;

use super::observe::ObserverTap;
use super::types::LineStream;

/// Drain `rd` line by line into `ring`, forwarding each line to `tap`.
///
/// Lines are decoded lossily; invalid UTF-8 never fails the reader. The task
/// resolves with the number of lines read once the stream hits EOF.
pub fn pump_lines<R>(
    rd: R,
    stream: LineStream,
    ring: Arc<RingLines>,
    tap: Option<ObserverTap>,
) -> JoinHandle<Result<u64, RunnerError>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut rd = BufReader::with_capacity(16 * 1024, rd);
        let mut buf: Vec<u8> = Vec::with_capacity(8 * 1024);
        let mut count = 0u64;

        loop {
            buf.clear();
            let n = rd
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| RunnerError::StreamIo {
                    stream: stream.label(),
                    source: e,
                })?;
            if n == 0 {
                break;
            }

            trim_newline(&mut buf);
            let line = String::from_utf8_lossy(&buf).into_owned();
            if let Some(tap) = tap.as_ref() {
                tap.emit(&line);
            }
            ring.push(line);
            count += 1;
        }

        Ok(count)
    })
}

fn trim_newline(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
}
