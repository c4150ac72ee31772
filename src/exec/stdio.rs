// src/exec/stdio.rs

//! Draining of a child's stdout/stderr pipes.
//!
//! Each piped stream gets its own Tokio task that reads chunks until EOF and
//! writes every chunk to the stream's destination set:
//!
//! - the matching parent stream (bind mode, or capture with `tee`)
//! - an in-memory [`CaptureBuffer`] (capture mode)
//! - a mirror buffer: with `combine`, the stderr task also writes into the
//!   stdout buffer, after its own buffer
//! - a per-line hook
//!
//! A stream with an empty destination set is still drained, so a chatty child
//! can never block on a full pipe.
//!
//! The two tasks run independently. When stderr is mirrored into the stdout
//! buffer, each chunk lands atomically but the order of chunks from the two
//! streams does not have to match the order the child wrote them in.

use std::fmt;
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{ProcError, Result};
use crate::types::StreamKind;

const CHUNK_SIZE: usize = 8 * 1024;

/// Callback invoked once per line of output.
pub type LineHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Shared, buffered in-memory sink for captured output.
///
/// Writes go through a `BufWriter`; [`CaptureBuffer::contents`] always flushes
/// before reading so callers never see bytes stuck in the writer.
#[derive(Clone)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<BufWriter<Vec<u8>>>>,
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BufWriter::new(Vec::new()))),
        }
    }
}

impl fmt::Debug for CaptureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.lock();
        f.debug_struct("CaptureBuffer")
            .field("flushed", &guard.get_ref().len())
            .field("buffered", &guard.buffer().len())
            .finish()
    }
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BufWriter<Vec<u8>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self, bytes: &[u8]) -> io::Result<()> {
        self.lock().write_all(bytes)
    }

    pub fn flush(&self) -> io::Result<()> {
        self.lock().flush()
    }

    /// Flush the writer and return a copy of everything written so far.
    pub fn contents(&self) -> io::Result<Vec<u8>> {
        let mut guard = self.lock();
        guard.flush()?;
        Ok(guard.get_ref().clone())
    }
}

/// Incremental newline splitter.
///
/// Bytes may arrive in arbitrary chunks; complete lines are emitted as soon as
/// their `\n` is seen, with a trailing `\r` stripped. Whatever is left at EOF
/// is emitted by [`LineSplitter::finish`].
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8], mut emit: impl FnMut(&str)) {
        let mut start = 0;
        for (idx, byte) in chunk.iter().enumerate() {
            if *byte != b'\n' {
                continue;
            }
            if self.pending.is_empty() {
                emit_line(&chunk[start..idx], &mut emit);
            } else {
                self.pending.extend_from_slice(&chunk[start..idx]);
                let line = std::mem::take(&mut self.pending);
                emit_line(&line, &mut emit);
            }
            start = idx + 1;
        }
        self.pending.extend_from_slice(&chunk[start..]);
    }

    pub fn finish(&mut self, mut emit: impl FnMut(&str)) {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            emit_line(&line, &mut emit);
        }
    }
}

fn emit_line(raw: &[u8], emit: &mut impl FnMut(&str)) {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    emit(&String::from_utf8_lossy(raw));
}

/// Destination set for one stream.
#[derive(Clone, Default)]
pub struct StreamRoute {
    /// Copy to the parent's own stdout/stderr.
    pub parent: bool,
    pub buffer: Option<CaptureBuffer>,
    pub mirror: Option<CaptureBuffer>,
    pub hook: Option<LineHook>,
}

impl fmt::Debug for StreamRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRoute")
            .field("parent", &self.parent)
            .field("buffer", &self.buffer.is_some())
            .field("mirror", &self.mirror.is_some())
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

/// The pair of drain tasks for one child.
#[derive(Debug, Default)]
pub struct StdioRouter {
    stdout: Option<JoinHandle<io::Result<u64>>>,
    stderr: Option<JoinHandle<io::Result<u64>>>,
}

impl StdioRouter {
    /// Start draining whichever pipes are present.
    pub fn spawn(
        pid: u32,
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
        stdout_route: StreamRoute,
        stderr_route: StreamRoute,
    ) -> Self {
        let stdout = stdout.map(|pipe| {
            tokio::spawn(route_stream(pid, StreamKind::Stdout, pipe, stdout_route))
        });
        let stderr = stderr.map(|pipe| {
            tokio::spawn(route_stream(pid, StreamKind::Stderr, pipe, stderr_route))
        });
        Self { stdout, stderr }
    }

    /// Wait for both drain tasks to reach EOF.
    ///
    /// Must only be called once the child has exited; joining earlier would
    /// simply block until it does.
    pub async fn join(self) -> Result<()> {
        let stdout = join_stream(StreamKind::Stdout, self.stdout).await;
        let stderr = join_stream(StreamKind::Stderr, self.stderr).await;
        stdout.and(stderr)
    }
}

async fn join_stream(
    kind: StreamKind,
    handle: Option<JoinHandle<io::Result<u64>>>,
) -> Result<()> {
    let Some(handle) = handle else {
        return Ok(());
    };

    let outcome = match handle.await {
        Ok(res) => res,
        Err(join_err) => Err(io::Error::other(join_err)),
    };

    outcome.map(|_| ()).map_err(|source| ProcError::Output {
        stream: kind.as_str(),
        source,
    })
}

fn parent_writer(kind: StreamKind) -> Box<dyn AsyncWrite + Unpin + Send> {
    match kind {
        StreamKind::Stdout => Box::new(tokio::io::stdout()),
        StreamKind::Stderr => Box::new(tokio::io::stderr()),
    }
}

async fn route_stream<R>(
    pid: u32,
    kind: StreamKind,
    mut reader: R,
    route: StreamRoute,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut parent = route.parent.then(|| parent_writer(kind));
    let mut splitter = route.hook.as_ref().map(|_| LineSplitter::new());
    let mut failure: Option<io::Error> = None;
    let mut total: u64 = 0;
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        total += n as u64;

        // A failing destination is dropped; the pipe keeps draining.
        if let Some(writer) = parent.as_mut() {
            let res = match writer.write_all(chunk).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = res {
                warn!(pid, stream = kind.as_str(), error = %e, "parent stream write failed; no longer echoing");
                parent = None;
                failure.get_or_insert(e);
            }
        }

        for sink in [&route.buffer, &route.mirror].into_iter().flatten() {
            if let Err(e) = sink.write(chunk) {
                failure.get_or_insert(e);
            }
        }

        if let (Some(splitter), Some(hook)) = (splitter.as_mut(), route.hook.as_ref()) {
            splitter.push(chunk, |line| hook(line));
        }
    }

    if let (Some(splitter), Some(hook)) = (splitter.as_mut(), route.hook.as_ref()) {
        splitter.finish(|line| hook(line));
    }

    for sink in [&route.buffer, &route.mirror].into_iter().flatten() {
        if let Err(e) = sink.flush() {
            failure.get_or_insert(e);
        }
    }

    debug!(pid, stream = kind.as_str(), bytes = total, "stream drained");

    match failure {
        Some(e) => Err(e),
        None => Ok(total),
    }
}
