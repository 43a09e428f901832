//! Call-stack capture at interception time
//!
//! The capture paths attribute every record to the code that issued the
//! request. Stack heuristics are pluggable behind [`InitiatorResolver`]; the
//! default resolver symbolicates via the `backtrace` crate and trims the
//! interceptor's own frames plus the capture plumbing above them.

use backtrace::Backtrace;

use crate::record::CallFrame;

/// Produces the call frames attributed to an intercepted request.
pub trait InitiatorResolver: Send + Sync {
    /// Capture the current stack, outermost caller first, with the
    /// interceptor's own frames removed. Unresolved fields default to `""`
    /// and `0`.
    fn capture(&self) -> Vec<CallFrame>;
}

/// Resolver that never captures anything; used when stacks are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResolver;

impl InitiatorResolver for NoopResolver {
    fn capture(&self) -> Vec<CallFrame> {
        Vec::new()
    }
}

/// Default resolver backed by a symbolicated backtrace.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktraceResolver;

impl InitiatorResolver for BacktraceResolver {
    fn capture(&self) -> Vec<CallFrame> {
        let trace = Backtrace::new();
        let mut frames = Vec::new();

        for frame in trace.frames() {
            for symbol in frame.symbols() {
                let name = symbol
                    .name()
                    .map(|n| n.to_string())
                    .unwrap_or_default();
                if is_plumbing_frame(&name) {
                    continue;
                }

                let url = symbol
                    .filename()
                    .map(|p| rewrite_frame_url(&p.to_string_lossy()))
                    .unwrap_or_default();
                // Symbol line/column info is 1-based; CDP frames are 0-based.
                let line_number = symbol.lineno().map(|l| l.saturating_sub(1)).unwrap_or(0);
                let column_number = symbol.colno().map(|c| c.saturating_sub(1)).unwrap_or(0);

                frames.push(CallFrame {
                    function_name: name,
                    url,
                    line_number,
                    column_number,
                    script_id: None,
                });
            }
        }

        frames.reverse();
        frames
    }
}

/// Frames belonging to the interceptor itself, its pipe into the resolver,
/// or the unwinder never reach a record.
fn is_plumbing_frame(symbol: &str) -> bool {
    const PLUMBING: &[&str] = &[
        "backtrace::",
        "netlens_core::initiator",
        "netlens::client",
        "netlens::fetch",
        "netlens::sink",
    ];
    PLUMBING.iter().any(|prefix| symbol.starts_with(prefix))
}

/// Paths rooted at `/` become `file://` URLs; empty filenames stay empty.
pub fn rewrite_frame_url(path: &str) -> String {
    if path.starts_with('/') {
        format!("file://{path}")
    } else {
        path.to_string()
    }
}
