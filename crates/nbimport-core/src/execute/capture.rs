//! Thread-local output capture.
//!
//! Capture scopes form a stack per thread. Writes go to the innermost scope
//! that captures the written channel; with no such scope they reach the real
//! process streams. Scopes on different threads never see each other's
//! output.

use std::cell::{Cell, RefCell};
use std::io::Write;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::record::{MimeBundle, Output, StreamName};

/// Which channels a scope captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    pub stdout: bool,
    pub stderr: bool,
    pub display: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::all()
    }
}

impl CaptureOptions {
    pub const fn all() -> Self {
        Self {
            stdout: true,
            stderr: true,
            display: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            stdout: false,
            stderr: false,
            display: false,
        }
    }

    fn captures_stream(&self, stream: StreamName) -> bool {
        match stream {
            StreamName::Stdout => self.stdout,
            StreamName::Stderr => self.stderr,
        }
    }
}

struct Frame {
    id: u64,
    options: CaptureOptions,
    outputs: Vec<Output>,
}

impl Frame {
    fn push_stream(&mut self, stream: StreamName, text: &str) {
        if let Some(Output::Stream { name, text: last }) = self.outputs.last_mut()
            && *name == stream
        {
            last.push_str(text);
            return;
        }
        self.outputs.push(Output::Stream {
            name: stream,
            text: text.to_string(),
        });
    }
}

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
    static NEXT_ID: Cell<u64> = const { Cell::new(0) };
}

/// An active capture frame on the current thread.
///
/// Dropping the scope without calling [`finish`](Self::finish) discards what
/// it captured.
#[must_use = "output is only captured while the scope is alive"]
pub struct CaptureScope {
    id: u64,
    finished: bool,
    // Frames live in thread-local storage.
    _not_send: PhantomData<*const ()>,
}

impl std::fmt::Debug for CaptureScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureScope").field("id", &self.id).finish()
    }
}

impl CaptureScope {
    /// Push a new innermost frame.
    pub fn enter(options: CaptureOptions) -> Self {
        let id = NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        FRAMES.with(|frames| {
            frames.borrow_mut().push(Frame {
                id,
                options,
                outputs: Vec::new(),
            })
        });

        Self {
            id,
            finished: false,
            _not_send: PhantomData,
        }
    }

    /// Pop the frame and return what it captured, in order.
    pub fn finish(mut self) -> Vec<Output> {
        self.finished = true;
        remove_frame(self.id).unwrap_or_default()
    }

    /// Append an output to this scope directly, bypassing routing.
    pub fn push(&self, output: Output) {
        FRAMES.with(|frames| {
            if let Some(frame) = frames.borrow_mut().iter_mut().find(|f| f.id == self.id) {
                frame.outputs.push(output);
            }
        });
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        if !self.finished {
            remove_frame(self.id);
        }
    }
}

/// Remove a frame and any frames left above it by scopes that were leaked.
fn remove_frame(id: u64) -> Option<Vec<Output>> {
    FRAMES
        .try_with(|frames| {
            let mut frames = frames.borrow_mut();
            let position = frames.iter().position(|f| f.id == id)?;
            let frame = frames.drain(position..).next()?;
            Some(frame.outputs)
        })
        .ok()
        .flatten()
}

/// Number of active scopes on this thread.
pub fn depth() -> usize {
    FRAMES.with(|frames| frames.borrow().len())
}

/// Try to hand `output` to the innermost frame accepted by `accepts`.
fn route(accepts: impl Fn(&CaptureOptions) -> bool, deliver: impl FnOnce(&mut Frame)) -> bool {
    FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        match frames.iter_mut().rev().find(|frame| accepts(&frame.options)) {
            Some(frame) => {
                deliver(frame);
                true
            }
            None => false,
        }
    })
}

fn write_stream(stream: StreamName, text: &str) {
    if text.is_empty() {
        return;
    }
    let captured = route(
        |options| options.captures_stream(stream),
        |frame| frame.push_stream(stream, text),
    );
    if !captured {
        // Nothing sensible to do when the real stream is closed.
        let _ = match stream {
            StreamName::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(text.as_bytes()).and_then(|_| out.flush())
            }
            StreamName::Stderr => std::io::stderr().lock().write_all(text.as_bytes()),
        };
    }
}

/// Write to the cell's standard output.
pub fn write_stdout(text: &str) {
    write_stream(StreamName::Stdout, text);
}

/// Write to the cell's standard error.
pub fn write_stderr(text: &str) {
    write_stream(StreamName::Stderr, text);
}

/// Publish a rich display. Uncaptured displays print their `text/plain`.
pub fn publish_display(data: MimeBundle, metadata: Map<String, Value>) {
    publish(data, metadata, false);
}

/// Publish the value of a cell's trailing expression.
pub fn publish_result(data: MimeBundle) {
    publish(data, Map::new(), true);
}

fn publish(data: MimeBundle, metadata: Map<String, Value>, is_result: bool) {
    let mut pending = Some((data, metadata));
    let captured = route(
        |options| options.display,
        |frame| {
            if let Some((data, metadata)) = pending.take() {
                frame.outputs.push(if is_result {
                    Output::ExecuteResult { data, metadata }
                } else {
                    Output::DisplayData { data, metadata }
                });
            }
        },
    );

    if !captured
        && let Some((data, _)) = pending
        && let Some(text) = data.plain_text()
    {
        write_stream(StreamName::Stdout, &format!("{text}\n"));
    }
}

/// Print to the innermost capturing scope, like [`print!`].
#[macro_export]
macro_rules! cell_print {
    ($($arg:tt)*) => {
        $crate::execute::capture::write_stdout(&::std::format!($($arg)*))
    };
}

/// Print a line to the innermost capturing scope, like [`println!`].
#[macro_export]
macro_rules! cell_println {
    () => {
        $crate::execute::capture::write_stdout("\n")
    };
    ($($arg:tt)*) => {
        $crate::execute::capture::write_stdout(&::std::format!("{}\n", ::std::format_args!($($arg)*)))
    };
}

/// Like [`eprint!`], routed through capture scopes.
#[macro_export]
macro_rules! cell_eprint {
    ($($arg:tt)*) => {
        $crate::execute::capture::write_stderr(&::std::format!($($arg)*))
    };
}

/// Like [`eprintln!`], routed through capture scopes.
#[macro_export]
macro_rules! cell_eprintln {
    () => {
        $crate::execute::capture::write_stderr("\n")
    };
    ($($arg:tt)*) => {
        $crate::execute::capture::write_stderr(&::std::format!("{}\n", ::std::format_args!($($arg)*)))
    };
}
