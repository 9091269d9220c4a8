#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Call-stack capture for the faulthook panic interceptor.
//!
//! This crate walks the current stack, resolves symbols and source
//! locations, and trims the frames that only describe the capture machinery
//! itself (the panic runtime, the interceptor, this crate). What is left is
//! the part of the stack a person reading a crash report cares about.
//!
//! # Quick Start
//!
//! ```rust
//! use faulthook_backtrace::{CallStack, StackFilter};
//!
//! let stack = CallStack::capture(&StackFilter::DEFAULT);
//! for frame in stack.frames() {
//!     println!("{}", faulthook_backtrace::function_name(&frame.sym_demangled));
//! }
//! ```
//!
//! The [`Display`](std::fmt::Display) implementation of [`CallStack`] prints
//! a compact listing:
//!
//! ```text
//! handle_request - src/server.rs:88
//! main           - src/main.rs:12
//! note: 14 frame(s) omitted. For a complete backtrace, set RUST_BACKTRACE=full.
//! ```
//!
//! # Ordering
//!
//! Entries are ordered innermost-first: the first entry is the frame closest
//! to the point of capture, the last entry is the outermost caller.
//!
//! # Environment Variables
//!
//! [`StackFilter::from_env`] and [`EnvOptions::get`] read:
//!
//! - `RUST_BACKTRACE=full` - Keeps every frame past the capture machinery
//!   and shows full paths
//! - `FAULTHOOK_BACKTRACE` - Comma-separated options:
//!   - `off` - Do not capture call stacks at all
//!   - `full_paths` - Show full file paths
//!
//! # Debugging symbols in release builds
//!
//! Frames without a resolvable file name are dropped, so release builds need
//! debug information to produce useful stacks:
//!
//! ```toml
//! [profile.release]
//! strip = false
//! debug = "line-tables-only"
//! ```

use std::{borrow::Cow, fmt, sync::OnceLock};

use backtrace::BytesOrWideString;

/// A captured call stack.
///
/// # Examples
///
/// ```rust
/// use faulthook_backtrace::{CallStack, StackFilter};
///
/// let stack = CallStack::capture(&StackFilter::UNFILTERED);
/// println!("Captured {} entries", stack.entries.len());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStack {
    /// The entries of the stack, ordered from innermost to outermost.
    pub entries: Vec<StackEntry>,
    /// Total number of frames that were omitted due to filtering.
    pub total_omitted_frames: usize,
    /// Whether [`Display`](fmt::Display) prints full file paths, taken from
    /// the filter used for capture.
    pub show_full_path: bool,
}

/// A single entry in a [`CallStack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEntry {
    /// A resolved stack frame.
    Frame(Frame),
    /// A run of consecutive frames from one crate that were folded together.
    OmittedFrames {
        /// Number of omitted frames.
        count: usize,
        /// The name of the crate whose frames were omitted.
        skipped_crate: &'static str,
    },
}

/// A single resolved stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The demangled symbol name, without the trailing hash.
    pub sym_demangled: String,
    /// File path information for this frame, if available.
    pub frame_path: Option<FramePath>,
    /// Line number in the source file, if available.
    pub lineno: Option<u32>,
}

/// File path information for a stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePath {
    /// The raw file path from the debug information.
    pub raw_path: String,
    /// The crate the frame belongs to, if it could be determined.
    pub crate_name: Option<Cow<'static, str>>,
    /// Known prefix information used to shorten the displayed path.
    pub split_path: Option<FramePrefix>,
}

/// A known prefix of a frame path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePrefix {
    /// The kind of prefix, `"RUST_SRC"` for standard library sources or
    /// `"CARGO"` for crates from the cargo registry.
    pub prefix_kind: &'static str,
    /// The prefix that was split off the original path.
    pub prefix: String,
    /// The remaining path after the prefix, e.g.
    /// `"indexmap-2.12.1/src/map/core/entry.rs"`.
    pub suffix: String,
}

/// Configuration for which frames end up in a [`CallStack`].
///
/// Crate names are compared with `-` and `_` treated as equal, so
/// `"faulthook-backtrace"` also matches frames whose crate was detected from
/// a symbol as `faulthook_backtrace`.
///
/// # Examples
///
/// ```rust
/// use faulthook_backtrace::StackFilter;
///
/// let filter = StackFilter {
///     skipped_middle_crates: &["std", "tokio", "hyper"],
///     max_entry_count: 10,
///     ..StackFilter::DEFAULT
/// };
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StackFilter {
    /// Crates whose frames are dropped while they appear at the innermost
    /// end of the stack.
    pub skipped_initial_crates: &'static [&'static str],
    /// Crates whose consecutive frames are folded into a single
    /// [`StackEntry::OmittedFrames`] in the middle of the stack.
    pub skipped_middle_crates: &'static [&'static str],
    /// Crates whose frames are dropped at the outermost end of the stack.
    pub skipped_final_crates: &'static [&'static str],
    /// Maximum number of entries to keep.
    pub max_entry_count: usize,
    /// Whether [`Display`](fmt::Display) prints full file paths.
    pub show_full_path: bool,
}

/// Frames of the panic runtime and of the interceptor itself. They sit at
/// the innermost end of every stack captured from a panic hook.
const MACHINERY_CRATES: &[&str] = &[
    "backtrace",
    "faulthook",
    "faulthook-backtrace",
    "core",
    "std",
    "alloc",
];

impl StackFilter {
    /// Default filter: hides the panic runtime and the interceptor itself.
    pub const DEFAULT: Self = Self {
        skipped_initial_crates: MACHINERY_CRATES,
        skipped_middle_crates: &["std", "core", "alloc", "tokio"],
        skipped_final_crates: &["std", "core", "alloc", "tokio"],
        max_entry_count: 20,
        show_full_path: false,
    };

    /// Filter used under `RUST_BACKTRACE=full`: still trims the capture
    /// machinery at the innermost end, but keeps every other frame.
    pub const FULL: Self = Self {
        skipped_initial_crates: MACHINERY_CRATES,
        skipped_middle_crates: &[],
        skipped_final_crates: &[],
        max_entry_count: usize::MAX,
        show_full_path: true,
    };

    /// Keeps every resolvable frame.
    pub const UNFILTERED: Self = Self {
        skipped_initial_crates: &[],
        skipped_middle_crates: &[],
        skipped_final_crates: &[],
        max_entry_count: usize::MAX,
        show_full_path: true,
    };

    /// Builds a filter from `RUST_BACKTRACE` and `FAULTHOOK_BACKTRACE`.
    ///
    /// See [`from_env_options`](Self::from_env_options).
    pub fn from_env() -> Self {
        Self::from_env_options(EnvOptions::get())
    }

    /// Builds a filter from already parsed environment options.
    ///
    /// `RUST_BACKTRACE=full` selects [`StackFilter::FULL`]: no folding and no
    /// entry limit, though the capture machinery is still trimmed.
    /// `full_paths` in `FAULTHOOK_BACKTRACE` only switches path display.
    pub fn from_env_options(env_options: &EnvOptions) -> Self {
        let base = if env_options.rust_backtrace_full {
            Self::FULL
        } else {
            Self::DEFAULT
        };
        Self {
            show_full_path: env_options.show_full_path,
            ..base
        }
    }

    fn skips_initial(&self, crate_name: &str) -> bool {
        self.skipped_initial_crates
            .iter()
            .any(|skipped| same_crate(skipped, crate_name))
    }

    fn skipped_middle(&self, crate_name: &str) -> Option<&'static str> {
        self.skipped_middle_crates
            .iter()
            .copied()
            .find(|skipped| same_crate(skipped, crate_name))
    }

    fn skips_final(&self, crate_name: &str) -> bool {
        self.skipped_final_crates
            .iter()
            .any(|skipped| same_crate(skipped, crate_name))
    }
}

impl Default for StackFilter {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Options read once from the process environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvOptions {
    /// `RUST_BACKTRACE` was set to `full`.
    pub rust_backtrace_full: bool,
    /// Call-stack capture is enabled (`off` was not given).
    pub capture: bool,
    /// Full paths were requested, explicitly or through `RUST_BACKTRACE=full`.
    pub show_full_path: bool,
}

impl EnvOptions {
    /// Returns the options of this process, reading the environment on first
    /// use.
    pub fn get() -> &'static Self {
        static FAULTHOOK_FLAGS: OnceLock<EnvOptions> = OnceLock::new();

        FAULTHOOK_FLAGS.get_or_init(|| {
            let rust_backtrace = std::env::var("RUST_BACKTRACE").ok();
            let faulthook_backtrace = std::env::var("FAULTHOOK_BACKTRACE").ok();
            Self::parse(rust_backtrace.as_deref(), faulthook_backtrace.as_deref())
        })
    }

    /// Interprets the values of `RUST_BACKTRACE` and `FAULTHOOK_BACKTRACE`.
    pub fn parse(rust_backtrace: Option<&str>, faulthook_backtrace: Option<&str>) -> Self {
        let rust_backtrace_full = rust_backtrace == Some("full");
        let mut options = Self {
            rust_backtrace_full,
            capture: true,
            show_full_path: rust_backtrace_full,
        };
        for v in faulthook_backtrace.unwrap_or_default().split(',') {
            let v = v.trim();
            if v.eq_ignore_ascii_case("off") {
                options.capture = false;
            } else if v.eq_ignore_ascii_case("full_paths") {
                options.show_full_path = true;
            }
        }
        options
    }
}

fn is_separator(b: u8) -> bool {
    b == b'-' || b == b'_'
}

fn same_crate(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.bytes()
            .zip(b.bytes())
            .all(|(x, y)| x == y || (is_separator(x) && is_separator(y)))
}

/// Extracts the bare function name from a demangled symbol.
///
/// Generic parameters and impl headers are skipped, so
/// `"<alloc::boxed::Box<F> as core::ops::Fn<A>>::call"` yields `"call"` and
/// `"app::server::handle::{{closure}}"` yields `"{{closure}}"`.
pub fn function_name(s: &str) -> &str {
    let mut word_start = 0usize;
    let mut word_end = 0usize;
    let mut angle_nesting_level = 0u64;
    let mut curly_nesting_level = 0u64;
    let mut potential_function_arrow = false;
    let mut inside_word = false;

    for (i, c) in s.char_indices() {
        if curly_nesting_level == 0 && angle_nesting_level == 0 {
            if !inside_word && unicode_ident::is_xid_start(c) {
                word_start = i;
                inside_word = true;
            } else if inside_word && !unicode_ident::is_xid_continue(c) {
                word_end = i;
                inside_word = false;
            }
        }

        let was_potential_function_arrow = potential_function_arrow;
        potential_function_arrow = c == '-';

        if c == '<' {
            angle_nesting_level = angle_nesting_level.saturating_add(1);
        } else if c == '>' && !was_potential_function_arrow {
            angle_nesting_level = angle_nesting_level.saturating_sub(1);
        } else if c == '{' {
            curly_nesting_level = curly_nesting_level.saturating_add(1);
            if !inside_word && curly_nesting_level == 1 && angle_nesting_level == 0 {
                word_start = i;
                inside_word = true;
            }
        } else if c == '}' {
            curly_nesting_level = curly_nesting_level.saturating_sub(1);
            if inside_word && curly_nesting_level == 0 {
                word_end = i + 1;
                inside_word = false;
            }
        }
    }

    if word_start < word_end {
        &s[word_start..word_end]
    } else {
        // Started a word but the symbol ended inside it
        &s[word_start..]
    }
}

/// Guesses the crate of a frame from its demangled symbol.
///
/// Handles plain paths (`my_app::run`) and qualified impl paths
/// (`<my_app::Server as core::ops::Drop>::drop`), returning the first path
/// segment. Symbols without a `::` have no crate.
fn crate_from_symbol(sym: &str) -> Option<&str> {
    let path = sym.trim_start_matches('<');
    let (head, _) = path.split_once("::")?;
    if !head.is_empty() && head.chars().all(unicode_ident::is_xid_continue) {
        Some(head)
    } else {
        None
    }
}

impl Frame {
    /// The crate this frame belongs to, from its path or else its symbol.
    pub fn crate_name(&self) -> Option<&str> {
        self.frame_path
            .as_ref()
            .and_then(|path| path.crate_name.as_deref())
            .or_else(|| crate_from_symbol(&self.sym_demangled))
    }

    /// The bare function name of this frame.
    pub fn function(&self) -> &str {
        function_name(&self.sym_demangled)
    }

    /// The file name of this frame without its directories.
    pub fn file_name(&self) -> Option<&str> {
        let path = &self.frame_path.as_ref()?.raw_path;
        path.rsplit(['/', '\\']).next()
    }
}

impl CallStack {
    /// Walks the current stack and applies `filter`.
    ///
    /// Returns an empty stack when no frame could be resolved, e.g. in
    /// binaries built without debug information.
    pub fn capture(filter: &StackFilter) -> Self {
        let mut collector = Collector::new(filter);

        backtrace::trace(|frame| {
            backtrace::resolve_frame(frame, |symbol| {
                // Frames without a name or a file tell the reader nothing.
                let (Some(sym), Some(filename_raw)) = (symbol.name(), symbol.filename_raw()) else {
                    return;
                };

                if collector.is_full() {
                    collector.total_omitted_frames += 1;
                    return;
                }

                collector.push(Frame {
                    sym_demangled: format!("{sym:#}"),
                    frame_path: Some(FramePath::new(filename_raw)),
                    lineno: symbol.lineno(),
                });
            });

            true
        });

        collector.finish()
    }

    /// Iterates over the resolved frames, skipping omitted-frame markers.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.entries.iter().filter_map(|entry| match entry {
            StackEntry::Frame(frame) => Some(frame),
            StackEntry::OmittedFrames { .. } => None,
        })
    }

    /// The innermost resolved frame.
    pub fn innermost(&self) -> Option<&Frame> {
        self.frames().next()
    }

    /// Returns `true` if no entry was kept.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wraps the stack so it is displayed with full file paths.
    pub fn display_full_paths(&self) -> FullPaths<'_> {
        FullPaths(self)
    }

    fn write_listing(&self, f: &mut fmt::Formatter<'_>, show_full_path: bool) -> fmt::Result {
        const MAX_UNWRAPPED_SYM_LENGTH: usize = 25;
        let mut max_seen_length = 0;
        for frame in self.frames() {
            let sym = frame.function();
            if sym.len() <= MAX_UNWRAPPED_SYM_LENGTH && sym.len() > max_seen_length {
                max_seen_length = sym.len();
            }
        }

        for entry in &self.entries {
            match entry {
                StackEntry::OmittedFrames {
                    count,
                    skipped_crate,
                } => {
                    writeln!(
                        f,
                        "... omitted {count} frame(s) from crate '{skipped_crate}' ..."
                    )?;
                }
                StackEntry::Frame(frame) => {
                    let sym = frame.function();

                    if sym.len() <= MAX_UNWRAPPED_SYM_LENGTH {
                        write!(f, "{sym:<max_seen_length$} - ")?;
                    } else {
                        write!(f, "{sym}\n   - ")?;
                    }

                    if let Some(path) = &frame.frame_path {
                        if show_full_path {
                            write!(f, "{}", path.raw_path)?;
                        } else if let Some(split_path) = &path.split_path {
                            write!(f, "[..]/{}", split_path.suffix)?;
                        } else {
                            write!(f, "{}", path.raw_path)?;
                        }

                        if let Some(lineno) = frame.lineno {
                            write!(f, ":{lineno}")?;
                        }
                    }
                    writeln!(f)?;
                }
            }
        }

        if self.total_omitted_frames > 0 {
            writeln!(
                f,
                "note: {} frame(s) omitted. For a complete backtrace, set RUST_BACKTRACE=full.",
                self.total_omitted_frames
            )?;
        }

        Ok(())
    }
}

/// Applies a [`StackFilter`] to frames fed innermost-first.
struct Collector<'a> {
    filter: &'a StackFilter,
    initial_filtering: bool,
    entries: Vec<StackEntry>,
    total_omitted_frames: usize,
    delayed_omitted_frame: Option<Frame>,
    currently_omitted_crate_name: Option<&'static str>,
    currently_omitted_frames: usize,
}

impl<'a> Collector<'a> {
    fn new(filter: &'a StackFilter) -> Self {
        Self {
            filter,
            initial_filtering: !filter.skipped_initial_crates.is_empty(),
            entries: Vec::new(),
            total_omitted_frames: 0,
            delayed_omitted_frame: None,
            currently_omitted_crate_name: None,
            currently_omitted_frames: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.entries.len() >= self.filter.max_entry_count
    }

    fn push(&mut self, frame: Frame) {
        if self.is_full() {
            self.total_omitted_frames += 1;
            return;
        }

        let crate_name = frame.crate_name().map(str::to_owned);

        if self.initial_filtering {
            // Unwinder and libc glue: no crate and not a Rust path.
            let foreign = crate_name.is_none() && !frame.sym_demangled.contains("::");
            if foreign {
                self.total_omitted_frames += 1;
                return;
            } else if let Some(cur_crate_name) = &crate_name
                && self.filter.skips_initial(cur_crate_name)
            {
                self.total_omitted_frames += 1;
                return;
            } else {
                self.initial_filtering = false;
            }
        }

        if let Some(cur_crate_name) = &crate_name
            && let Some(currently_omitted_crate_name) = &self.currently_omitted_crate_name
            && same_crate(cur_crate_name, currently_omitted_crate_name)
        {
            self.delayed_omitted_frame = None;
            self.currently_omitted_frames += 1;
            self.total_omitted_frames += 1;
            return;
        }

        self.flush_omitted();
        // The folded run may have taken the last free slot.
        if self.is_full() {
            self.total_omitted_frames += 1;
            return;
        }

        if let Some(cur_crate_name) = &crate_name
            && let Some(skipped_crate) = self.filter.skipped_middle(cur_crate_name)
        {
            self.currently_omitted_crate_name = Some(skipped_crate);
            self.currently_omitted_frames = 1;
            self.total_omitted_frames += 1;
            self.delayed_omitted_frame = Some(frame);
            return;
        }

        self.entries.push(StackEntry::Frame(frame));
    }

    fn flush_omitted(&mut self) {
        if let Some(currently_omitted_crate_name) = self.currently_omitted_crate_name.take() {
            self.entries.push(fold_omitted(
                self.delayed_omitted_frame.take(),
                self.currently_omitted_frames,
                currently_omitted_crate_name,
            ));
            self.currently_omitted_frames = 0;
        }
    }

    fn finish(mut self) -> CallStack {
        self.flush_omitted();

        let filter = self.filter;
        let entries = &mut self.entries;
        while let Some(last) = entries.last() {
            match last {
                StackEntry::Frame(frame) => {
                    let skip = frame
                        .crate_name()
                        .is_some_and(|crate_name| filter.skips_final(crate_name))
                        || frame.sym_demangled == "__libc_start_call_main"
                        || frame.sym_demangled == "__libc_start_main_impl"
                        || frame.sym_demangled == "_start";

                    if skip {
                        self.total_omitted_frames += 1;
                        entries.pop();
                    } else {
                        break;
                    }
                }
                StackEntry::OmittedFrames {
                    skipped_crate,
                    count,
                } => {
                    if filter.skips_final(skipped_crate) {
                        self.total_omitted_frames += count;
                        entries.pop();
                    } else {
                        break;
                    }
                }
            }
        }

        CallStack {
            entries: self.entries,
            total_omitted_frames: self.total_omitted_frames,
            show_full_path: filter.show_full_path,
        }
    }
}

fn fold_omitted(
    delayed_frame: Option<Frame>,
    count: usize,
    skipped_crate: &'static str,
) -> StackEntry {
    match delayed_frame {
        Some(frame) => StackEntry::Frame(frame),
        None => StackEntry::OmittedFrames {
            count,
            skipped_crate,
        },
    }
}

impl fmt::Display for CallStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_listing(f, self.show_full_path)
    }
}

/// Displays a [`CallStack`] with full file paths.
///
/// Returned by [`CallStack::display_full_paths`].
#[derive(Debug, Clone, Copy)]
pub struct FullPaths<'a>(&'a CallStack);

impl fmt::Display for FullPaths<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.write_listing(f, true)
    }
}

impl FramePath {
    fn new(path: BytesOrWideString<'_>) -> Self {
        Self::from_raw(path.to_str_lossy().into_owned())
    }

    /// Classifies a raw source path, detecting standard library and cargo
    /// registry sources.
    pub fn from_raw(raw_path: String) -> Self {
        static REGEXES: OnceLock<[regex::Regex; 2]> = OnceLock::new();
        let [std_regex, registry_regex] = REGEXES.get_or_init(|| {
            [
                // Matches Rust standard library paths:
                // - /lib/rustlib/src/rust/library/{std|core|alloc}/src/...
                // - /rustc/{40-char-hash}/library/{std|core|alloc}/src/...
                regex::Regex::new(
                    r"(?:/lib/rustlib/src/rust|^/rustc/[0-9a-f]{40})/library/(std|core|alloc)/src/.*$",
                )
                .expect("built-in regex pattern for std library paths should be valid"),
                // Matches Cargo registry paths:
                // - /.cargo/registry/src/{index}-{16-char-hash}/{crate}-{version}/src/...
                regex::Regex::new(
                    r"/\.cargo/registry/src/[^/]+-[0-9a-f]{16}/([^./]+)-[0-9]+\.[^/]*/src/.*$",
                )
                .expect("built-in regex pattern for cargo registry paths should be valid"),
            ]
        });

        let classified = [(std_regex, "RUST_SRC"), (registry_regex, "CARGO")]
            .into_iter()
            .find_map(|(regex, prefix_kind)| {
                let crate_capture = regex.captures(&raw_path)?.get(1)?;
                let split = crate_capture.start();
                Some((
                    crate_capture.as_str().to_string(),
                    FramePrefix {
                        prefix_kind,
                        prefix: raw_path[..split - 1].to_string(),
                        suffix: raw_path[split..].to_string(),
                    },
                ))
            });

        match classified {
            Some((crate_name, split_path)) => Self {
                raw_path,
                crate_name: Some(crate_name.into()),
                split_path: Some(split_path),
            },
            None => Self {
                raw_path,
                crate_name: None,
                split_path: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sym: &str, path: &str, lineno: u32) -> Frame {
        Frame {
            sym_demangled: sym.to_string(),
            frame_path: Some(FramePath::from_raw(path.to_string())),
            lineno: Some(lineno),
        }
    }

    #[test]
    fn test_types_send_sync() {
        static_assertions::assert_impl_all!(CallStack: Send, Sync, Clone);
        static_assertions::assert_impl_all!(StackFilter: Send, Sync, Copy);
    }

    #[test]
    fn test_function_name() {
        assert_eq!(function_name("my_app::server::handle_request"), "handle_request");
        assert_eq!(
            function_name("<alloc::boxed::Box<F,A> as core::ops::function::Fn<Args>>::call"),
            "call"
        );
        assert_eq!(function_name("my_app::main::{{closure}}"), "{{closure}}");
        assert_eq!(function_name("std::rt::lang_start::<()>"), "lang_start");
        assert_eq!(function_name("my_app::apply::<fn() -> u32>"), "apply");
    }

    #[test]
    fn test_crate_from_symbol() {
        assert_eq!(crate_from_symbol("my_app::run"), Some("my_app"));
        assert_eq!(
            crate_from_symbol("<faulthook::client::RecordingClient as faulthook::ReportingClient>::capture"),
            Some("faulthook")
        );
        assert_eq!(crate_from_symbol("_start"), None);
        assert_eq!(crate_from_symbol("<&T as core::fmt::Debug>::fmt"), None);
    }

    #[test]
    fn test_same_crate_ignores_dash_and_underscore() {
        assert!(same_crate("faulthook-backtrace", "faulthook_backtrace"));
        assert!(same_crate("std", "std"));
        assert!(!same_crate("std", "core"));
        assert!(!same_crate("faulthook", "faulthook_backtrace"));
    }

    #[test]
    fn test_frame_path_classification() {
        let std_path = FramePath::from_raw(
            "/rustc/0123456789abcdef0123456789abcdef01234567/library/std/src/panicking.rs"
                .to_string(),
        );
        assert_eq!(std_path.crate_name.as_deref(), Some("std"));
        let split = std_path.split_path.expect("std path should be split");
        assert_eq!(split.prefix_kind, "RUST_SRC");
        assert_eq!(split.suffix, "std/src/panicking.rs");

        let registry_path = FramePath::from_raw(
            "/home/user/.cargo/registry/src/index.crates.io-1949cf8c6b5b557f/tokio-1.40.0/src/runtime/task.rs"
                .to_string(),
        );
        assert_eq!(registry_path.crate_name.as_deref(), Some("tokio"));
        assert_eq!(
            registry_path.split_path.map(|p| p.suffix).as_deref(),
            Some("tokio-1.40.0/src/runtime/task.rs")
        );

        let local_path = FramePath::from_raw("/build/src/main.rs".to_string());
        assert_eq!(local_path.crate_name, None);
        assert_eq!(local_path.split_path, None);
    }

    #[test]
    fn test_frame_crate_falls_back_to_symbol() {
        let local = frame("my_app::worker::run", "/build/src/worker.rs", 7);
        assert_eq!(local.crate_name(), Some("my_app"));
        assert_eq!(local.function(), "run");
        assert_eq!(local.file_name(), Some("worker.rs"));

        let registry = frame(
            "tokio::runtime::task::poll",
            "/home/u/.cargo/registry/src/index.crates.io-1949cf8c6b5b557f/tokio-1.40.0/src/runtime/task.rs",
            3,
        );
        assert_eq!(registry.crate_name(), Some("tokio"));
    }

    #[test]
    fn test_env_options_parse() {
        let defaults = EnvOptions::parse(None, None);
        assert!(defaults.capture);
        assert!(!defaults.rust_backtrace_full);
        assert!(!defaults.show_full_path);

        let full = EnvOptions::parse(Some("full"), None);
        assert!(full.rust_backtrace_full);
        assert!(full.show_full_path);

        let one = EnvOptions::parse(Some("1"), Some("full_paths"));
        assert!(!one.rust_backtrace_full);
        assert!(one.show_full_path);

        let off = EnvOptions::parse(None, Some("FULL_PATHS, off"));
        assert!(!off.capture);
        assert!(off.show_full_path);
    }

    #[test]
    fn test_display_listing() {
        let stack = CallStack {
            entries: vec![
                StackEntry::Frame(frame("my_app::load", "/build/src/config.rs", 12)),
                StackEntry::OmittedFrames {
                    count: 3,
                    skipped_crate: "std",
                },
                StackEntry::Frame(frame(
                    "tokio::runtime::block_on",
                    "/home/u/.cargo/registry/src/index.crates.io-1949cf8c6b5b557f/tokio-1.40.0/src/runtime/mod.rs",
                    40,
                )),
                StackEntry::Frame(frame("my_app::main", "/build/src/main.rs", 5)),
            ],
            total_omitted_frames: 5,
            show_full_path: false,
        };

        let expected = "\
load     - /build/src/config.rs:12
... omitted 3 frame(s) from crate 'std' ...
block_on - [..]/tokio-1.40.0/src/runtime/mod.rs:40
main     - /build/src/main.rs:5
note: 5 frame(s) omitted. For a complete backtrace, set RUST_BACKTRACE=full.
";
        assert_eq!(stack.to_string(), expected);
        assert!(
            stack
                .display_full_paths()
                .to_string()
                .contains("/.cargo/registry/src/index.crates.io-1949cf8c6b5b557f/tokio-1.40.0/src/runtime/mod.rs:40")
        );
        assert_eq!(stack.innermost().map(Frame::function), Some("load"));
        assert_eq!(stack.frames().count(), 3);
    }

    fn collect(filter: &StackFilter, frames: Vec<Frame>) -> CallStack {
        let mut collector = Collector::new(filter);
        for frame in frames {
            collector.push(frame);
        }
        collector.finish()
    }

    const STD_SRC: &str =
        "/rustc/0123456789abcdef0123456789abcdef01234567/library/std/src/panicking.rs";

    fn hook_stack() -> Vec<Frame> {
        vec![
            frame("backtrace::backtrace::libunwind::trace", "/home/u/.cargo/registry/src/index.crates.io-1949cf8c6b5b557f/backtrace-0.3.76/src/backtrace/libunwind.rs", 117),
            frame("faulthook_backtrace::CallStack::capture", "faulthook-backtrace/src/lib.rs", 440),
            frame("faulthook::interceptor::FaultInterceptor::handle_fault", "src/interceptor.rs", 264),
            frame("std::panicking::rust_panic_with_hook", STD_SRC, 841),
            frame("std::panicking::begin_panic::{{closure}}", STD_SRC, 770),
            frame("faulthook::interceptor::raise", "src/interceptor.rs", 213),
            frame("my_app::flush", "/build/src/store.rs", 31),
            frame("std::rt::lang_start_internal", STD_SRC, 175),
            frame("my_app::main", "/build/src/main.rs", 5),
            frame("std::rt::lang_start", STD_SRC, 199),
            frame("__libc_start_main_impl", "./csu/../csu/libc-start.c", 360),
        ]
    }

    #[test]
    fn test_full_filter_still_trims_machinery() {
        let options = EnvOptions::parse(Some("full"), None);
        let filter = StackFilter::from_env_options(&options);
        assert_eq!(filter.skipped_initial_crates, StackFilter::DEFAULT.skipped_initial_crates);
        assert!(filter.skipped_middle_crates.is_empty());
        assert_eq!(filter.max_entry_count, usize::MAX);
        assert!(filter.show_full_path);

        let stack = collect(&filter, hook_stack());
        assert_eq!(stack.innermost().map(Frame::function), Some("flush"));
        // Only the libc entry point is dropped past the first application
        // frame.
        assert_eq!(stack.total_omitted_frames, 7);
        assert_eq!(stack.frames().count(), 4);
        assert!(
            stack
                .entries
                .iter()
                .all(|entry| matches!(entry, StackEntry::Frame(_)))
        );
    }

    #[test]
    fn test_default_filter_from_env_options() {
        let filter = StackFilter::from_env_options(&EnvOptions::parse(None, None));
        assert_eq!(filter, StackFilter::DEFAULT);

        let filter = StackFilter::from_env_options(&EnvOptions::parse(Some("1"), Some("full_paths")));
        assert_eq!(
            filter,
            StackFilter {
                show_full_path: true,
                ..StackFilter::DEFAULT
            }
        );

        let stack = collect(&filter, hook_stack());
        assert_eq!(stack.innermost().map(Frame::function), Some("flush"));
        assert_eq!(
            stack.frames().map(Frame::function).collect::<Vec<_>>(),
            ["flush", "lang_start_internal", "main"]
        );
        assert_eq!(stack.total_omitted_frames, 10);
    }

    #[test]
    fn test_fold_does_not_exceed_max_entry_count() {
        let filter = StackFilter {
            skipped_initial_crates: &[],
            skipped_final_crates: &[],
            max_entry_count: 2,
            ..StackFilter::DEFAULT
        };
        let stack = collect(
            &filter,
            vec![
                frame("my_app::flush", "/build/src/store.rs", 31),
                frame("std::thread::scope", STD_SRC, 10),
                frame("std::thread::scope::{{closure}}", STD_SRC, 12),
                frame("my_app::worker", "/build/src/worker.rs", 8),
                frame("my_app::main", "/build/src/main.rs", 5),
            ],
        );

        assert_eq!(stack.entries.len(), 2);
        assert_eq!(
            stack.entries[1],
            StackEntry::OmittedFrames {
                count: 2,
                skipped_crate: "std",
            }
        );
        assert_eq!(stack.total_omitted_frames, 4);
    }

    #[test]
    fn test_capture_here() {
        let stack = CallStack::capture(&StackFilter::UNFILTERED);
        assert_eq!(stack.total_omitted_frames, 0);
        assert!(
            stack
                .frames()
                .any(|frame| frame.sym_demangled.contains("test_capture_here"))
        );
    }

    #[test]
    fn test_capture_respects_max_entry_count() {
        let filter = StackFilter {
            max_entry_count: 1,
            ..StackFilter::UNFILTERED
        };
        let stack = CallStack::capture(&filter);
        assert!(stack.entries.len() <= 1);
    }
}
