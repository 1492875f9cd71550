//! Newline-delimited JSON -> [`FragmentStream`] adapter.

use futures::StreamExt;
use reqwest::Response;

use crate::provider::{FragmentStream, InferenceError, Result};

/// What a line handler decided about one NDJSON line.
#[derive(Debug, PartialEq)]
pub enum LineOutcome {
    Fragment(String),
    /// Final line; an optional last fragment is emitted before the stream ends.
    Done(Option<String>),
    Skip,
}

/// Convert a streaming HTTP [`Response`] into a [`FragmentStream`].
///
/// Lines are split on `\n` across chunk boundaries; blank lines never reach
/// `handler`. A handler error ends the stream after being yielded.
pub fn fragment_stream_from_ndjson<H>(response: Response, mut handler: H) -> FragmentStream
where
    H: FnMut(&str) -> Result<LineOutcome> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;

        while !finished {
            match body.next().await {
                Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                Some(Err(error)) => {
                    yield Err(InferenceError::Stream(error.to_string()));
                    return;
                }
                None => {
                    if buffer.is_empty() {
                        break;
                    }
                    buffer.push(b'\n');
                    finished = true;
                }
            }

            while let Some(pos) = buffer.iter().position(|byte| *byte == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match handler(line) {
                    Ok(LineOutcome::Fragment(fragment)) => yield Ok(fragment),
                    Ok(LineOutcome::Done(last)) => {
                        if let Some(fragment) = last {
                            yield Ok(fragment);
                        }
                        return;
                    }
                    Ok(LineOutcome::Skip) => {}
                    Err(error) => {
                        yield Err(error);
                        return;
                    }
                }
            }
        }
    };

    Box::pin(stream)
}
