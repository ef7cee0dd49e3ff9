use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::delivery::DeliveryClient;
use crate::dispatcher::Dispatcher;
use crate::formatter::format_line;

/// Why [`pump`] stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    Eof,
    Cancelled,
}

/// Read newline-delimited log lines from `reader` and append each formatted
/// line to the dispatcher until EOF or cancellation.
///
/// Invalid UTF-8 is replaced rather than rejected, so one malformed line
/// never stops ingestion.
///
/// Returns how reading ended and how many entries were appended.
pub async fn pump<R, C>(
    mut reader: R,
    dispatcher: &Dispatcher<C>,
    cancel: &CancellationToken,
) -> std::io::Result<(PumpEnd, usize)>
where
    R: AsyncBufRead + Unpin,
    C: DeliveryClient,
{
    let mut buf = Vec::new();
    let mut appended = 0;

    loop {
        buf.clear();
        let read = tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => read?,
            _ = cancel.cancelled() => return Ok((PumpEnd::Cancelled, appended)),
        };
        if read == 0 {
            return Ok((PumpEnd::Eof, appended));
        }

        match format_line(&String::from_utf8_lossy(&buf)) {
            Ok(Some(entry)) => {
                dispatcher.append(entry);
                appended += 1;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "skipping unformattable line"),
        }
    }
}
