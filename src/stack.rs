//! Call-stack section printed at the end of every failure report.
//!
//! With the `backtrace` feature (on by default) the stack is captured with the
//! [`backtrace`] crate and every frame is classified by its symbol and source
//! path. Frames of this crate and of the Rust toolchain are hidden, so the
//! first line of the section is the code that called the failing predicate.
//! Without the feature the report falls back to
//! [`std::backtrace::Backtrace::force_capture`].
//!
//! # Environment Variables
//!
//! - `RUST_BACKTRACE=full`: keep every frame and print full paths.
//! - `TRIPWIRE_BACKTRACE`: comma-separated options.
//!   - `full_paths`: print full file paths.
//!   - `off`: leave the stack section out of reports.

use alloc::string::String;
#[cfg(feature = "backtrace")]
use alloc::{string::ToString, vec::Vec};
#[cfg(feature = "backtrace")]
use core::{fmt, ops::Range};
use std::sync::OnceLock;

/// Decides which frames of a captured stack appear in a report.
///
/// # Examples
///
/// ```rust
/// use tripwire::stack::StackFilter;
///
/// let filter = StackFilter {
///     hidden_crates: &["tokio", "hyper"],
///     max_frames: 10,
///     ..StackFilter::DEFAULT
/// };
/// assert!(filter.hide_internal);
/// ```
#[derive(Copy, Clone, Debug)]
pub struct StackFilter {
    /// Hide frames of this crate and of the Rust toolchain (`std`, `core`,
    /// `alloc`, the test harness and the process entry point).
    pub hide_internal: bool,
    /// Registry crates whose frames are hidden.
    pub hidden_crates: &'static [&'static str],
    /// Maximum number of frames to print.
    pub max_frames: usize,
    /// Print full file paths instead of shortening toolchain and registry
    /// paths.
    pub full_paths: bool,
}

impl StackFilter {
    /// Hides internal frames and prints at most 20.
    pub const DEFAULT: Self = Self {
        hide_internal: true,
        hidden_crates: &[],
        max_frames: 20,
        full_paths: false,
    };

    /// Keeps every frame.
    pub const FULL: Self = Self {
        hide_internal: false,
        hidden_crates: &[],
        max_frames: usize::MAX,
        full_paths: true,
    };

    /// Filter derived from `RUST_BACKTRACE` and `TRIPWIRE_BACKTRACE`.
    pub fn from_env() -> Self {
        let options = EnvOptions::get();
        let base = if options.rust_backtrace_full {
            StackFilter::FULL
        } else {
            StackFilter::DEFAULT
        };
        StackFilter {
            full_paths: options.full_paths,
            ..base
        }
    }

    #[cfg(feature = "backtrace")]
    fn keeps(&self, frame: &StackFrame) -> bool {
        match &frame.origin {
            FrameOrigin::Tripwire | FrameOrigin::Toolchain => !self.hide_internal,
            FrameOrigin::Dependency(name) => !self.hidden_crates.contains(&name.as_str()),
            // Unresolved frames carry no file. They are libc or JIT code.
            FrameOrigin::Application => frame.file.is_some() || !self.hide_internal,
        }
    }
}

impl Default for StackFilter {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Stack settings of a [`Diagnostics`](crate::Diagnostics).
#[derive(Copy, Clone, Debug)]
pub(crate) struct StackConfig {
    pub(crate) enabled: bool,
    pub(crate) filter: StackFilter,
}

impl StackConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            enabled: !EnvOptions::get().disabled,
            filter: StackFilter::from_env(),
        }
    }

    /// Captures and renders the current stack, or returns `None` when the
    /// stack section is disabled or nothing could be captured.
    pub(crate) fn render(&self) -> Option<String> {
        if !self.enabled {
            return None;
        }

        #[cfg(feature = "backtrace")]
        {
            StackTrace::capture(&self.filter).map(|trace| trace.to_string())
        }

        #[cfg(not(feature = "backtrace"))]
        {
            Some(alloc::format!(
                "{}",
                std::backtrace::Backtrace::force_capture()
            ))
        }
    }
}

#[derive(Debug)]
struct EnvOptions {
    rust_backtrace_full: bool,
    full_paths: bool,
    disabled: bool,
}

impl EnvOptions {
    fn get() -> &'static Self {
        static OPTIONS: OnceLock<EnvOptions> = OnceLock::new();

        OPTIONS.get_or_init(|| {
            let rust_backtrace_full =
                std::env::var_os("RUST_BACKTRACE").is_some_and(|var| var == "full");
            let mut options = EnvOptions {
                rust_backtrace_full,
                full_paths: rust_backtrace_full,
                disabled: false,
            };
            if let Some(var) = std::env::var_os("TRIPWIRE_BACKTRACE") {
                for option in var.to_string_lossy().split(',').map(str::trim) {
                    if option.eq_ignore_ascii_case("full_paths") {
                        options.full_paths = true;
                    } else if option.eq_ignore_ascii_case("off") {
                        options.disabled = true;
                    }
                }
            }
            options
        })
    }
}

/// Where the code of a [`StackFrame`] comes from.
#[cfg(feature = "backtrace")]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameOrigin {
    /// This crate: the predicates and the report pipeline.
    Tripwire,
    /// The standard library, the test harness, the unwinder or the process
    /// entry point.
    Toolchain,
    /// A crate from the Cargo registry, by name.
    Dependency(String),
    /// Anything else.
    Application,
}

/// One resolved frame of a [`StackTrace`].
#[cfg(feature = "backtrace")]
#[derive(Clone, Debug)]
pub struct StackFrame {
    /// Demangled symbol, without the hash suffix.
    pub symbol: String,
    /// Source file, if the debug information has one.
    pub file: Option<String>,
    /// Line in `file`.
    pub line: Option<u32>,
    /// Classification of the frame, derived from `symbol` and `file`.
    pub origin: FrameOrigin,
}

#[cfg(feature = "backtrace")]
const TOOLCHAIN_PREFIXES: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "test::",
    "backtrace::",
    "panic_unwind::",
    "__rust",
    "__libc_start",
    "_start",
    "rust_begin_unwind",
];

#[cfg(feature = "backtrace")]
fn is_tripwire_symbol(symbol: &str) -> bool {
    symbol.starts_with("tripwire::")
        || symbol.contains("<tripwire::")
        || symbol.contains(" as tripwire::")
}

#[cfg(feature = "backtrace")]
fn is_toolchain_symbol(symbol: &str) -> bool {
    let unqualified = symbol.strip_prefix('<').unwrap_or(symbol);
    TOOLCHAIN_PREFIXES
        .iter()
        .any(|prefix| unqualified.starts_with(prefix))
}

#[cfg(feature = "backtrace")]
struct PathPatterns {
    // /rustc/<hash>/library/<crate>/src/... and the rust-src component
    toolchain: regex::Regex,
    // ~/.cargo/registry/src/<index>-<hash>/<crate>-<version>/src/...
    registry: regex::Regex,
}

#[cfg(feature = "backtrace")]
impl PathPatterns {
    fn get() -> &'static Self {
        static PATTERNS: OnceLock<PathPatterns> = OnceLock::new();
        PATTERNS.get_or_init(|| PathPatterns {
            toolchain: regex::Regex::new(
                r"(?:^/rustc/[0-9a-f]{40}|/lib/rustlib/src/rust)/library/(([a-z_]+)/src/.*)$",
            )
            .expect("toolchain path pattern is valid"),
            registry: regex::Regex::new(
                r"/\.cargo/registry/src/[^/]+/(([A-Za-z0-9_-]+?)-[0-9]+\.[^/]*/src/.*)$",
            )
            .expect("registry path pattern is valid"),
        })
    }
}

#[cfg(feature = "backtrace")]
impl StackFrame {
    /// Builds a frame and classifies it.
    pub fn new(symbol: String, file: Option<String>, line: Option<u32>) -> Self {
        let origin = Self::classify(&symbol, file.as_deref());
        Self {
            symbol,
            file,
            line,
            origin,
        }
    }

    fn classify(symbol: &str, file: Option<&str>) -> FrameOrigin {
        if is_tripwire_symbol(symbol) {
            return FrameOrigin::Tripwire;
        }
        if is_toolchain_symbol(symbol) {
            return FrameOrigin::Toolchain;
        }
        let Some(file) = file else {
            return FrameOrigin::Application;
        };
        let patterns = PathPatterns::get();
        if patterns.toolchain.is_match(file) {
            FrameOrigin::Toolchain
        } else if let Some(name) = patterns
            .registry
            .captures(file)
            .and_then(|captures| captures.get(2))
        {
            FrameOrigin::Dependency(name.as_str().to_string())
        } else {
            FrameOrigin::Application
        }
    }

    /// The function name without its module path, generic arguments or
    /// trait qualification. Closures keep the name of their parent.
    pub fn short_name(&self) -> &str {
        short_name(&self.symbol)
    }

    /// The source file, shortened to start at the crate directory for
    /// toolchain and registry files.
    pub fn short_file(&self) -> Option<&str> {
        let file = self.file.as_deref()?;
        let patterns = PathPatterns::get();
        let relative = patterns
            .toolchain
            .captures(file)
            .or_else(|| patterns.registry.captures(file))
            .and_then(|captures| captures.get(1));
        Some(relative.map_or(file, |relative| &file[relative.start()..]))
    }
}

#[cfg(feature = "backtrace")]
fn starts_identifier(segment: &str) -> bool {
    segment
        .chars()
        .next()
        .is_some_and(|c| c == '_' || unicode_ident::is_xid_start(c))
}

// Splits `a::<T>::b<U>::{{closure}}` at the `::` separators that are not
// inside angle brackets.
#[cfg(feature = "backtrace")]
fn path_segments(symbol: &str) -> Vec<Range<usize>> {
    let bytes = symbol.as_bytes();
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            // `->` in fn pointer types
            b'>' if i == 0 || bytes[i - 1] != b'-' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                segments.push(start..i);
                i += 2;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    segments.push(start..bytes.len());
    segments
}

#[cfg(feature = "backtrace")]
fn short_name(symbol: &str) -> &str {
    let segments = path_segments(symbol);
    let segment = |index: usize| &symbol[segments[index].clone()];

    let Some(first) = (0..segments.len()).rposition(|index| starts_identifier(segment(index)))
    else {
        return symbol;
    };
    let mut last = first;
    while last + 1 < segments.len() && segment(last + 1).starts_with('{') {
        last += 1;
    }

    let name = &symbol[segments[first].start..segments[last].end];
    if first == last
        && let Some(generics) = name.find('<')
    {
        return &name[..generics];
    }
    name
}

/// A captured and filtered call stack, most recent call first.
#[cfg(feature = "backtrace")]
#[derive(Clone, Debug)]
pub struct StackTrace {
    /// The frames that passed the filter.
    pub frames: Vec<StackFrame>,
    /// Number of frames the filter left out.
    pub hidden: usize,
    full_paths: bool,
}

#[cfg(feature = "backtrace")]
impl StackTrace {
    /// Captures the current stack, applying `filter`.
    ///
    /// Returns `None` if no frame could be resolved.
    pub fn capture(filter: &StackFilter) -> Option<Self> {
        let mut frames = Vec::new();
        backtrace::trace(|frame| {
            backtrace::resolve_frame(frame, |symbol| {
                if let Some(name) = symbol.name() {
                    frames.push(StackFrame::new(
                        alloc::format!("{name:#}"),
                        symbol
                            .filename()
                            .map(|path| path.to_string_lossy().into_owned()),
                        symbol.lineno(),
                    ));
                }
            });
            true
        });

        if frames.is_empty() {
            return None;
        }
        Some(Self::filtered(frames, filter))
    }

    /// Applies `filter` to already resolved frames.
    pub fn filtered(frames: Vec<StackFrame>, filter: &StackFilter) -> Self {
        let total = frames.len();
        let mut kept: Vec<StackFrame> = frames
            .into_iter()
            .filter(|frame| filter.keeps(frame))
            .collect();
        kept.truncate(filter.max_frames);
        Self {
            hidden: total - kept.len(),
            frames: kept,
            full_paths: filter.full_paths,
        }
    }
}

#[cfg(feature = "backtrace")]
impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Longer names are not padded.
        const MAX_ALIGNED_NAME: usize = 30;

        let width = self
            .frames
            .iter()
            .map(|frame| frame.short_name().len())
            .filter(|len| *len <= MAX_ALIGNED_NAME)
            .max()
            .unwrap_or(0);

        for frame in &self.frames {
            write!(f, "{:<width$} - ", frame.short_name())?;
            let file = if self.full_paths {
                frame.file.as_deref()
            } else {
                frame.short_file()
            };
            match (file, frame.line) {
                (Some(file), Some(line)) => writeln!(f, "{file}:{line}")?,
                (Some(file), None) => writeln!(f, "{file}")?,
                (None, _) => writeln!(f, "<unknown>")?,
            }
        }

        if self.hidden > 0 {
            writeln!(
                f,
                "note: {} frame(s) hidden. For a complete stack, set RUST_BACKTRACE=full.",
                self.hidden
            )?;
        }
        Ok(())
    }
}
