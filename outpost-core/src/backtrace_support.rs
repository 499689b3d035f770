use backtrace::Backtrace;

use crate::protocol::{Frame, Stacktrace};

const WELL_KNOWN_NOT_IN_APP: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "backtrace::",
    "outpost::",
    "outpost_core::",
    "outpost_types::",
    // these are not modules but things like __rust_maybe_catch_panic
    "__rust_",
    "___rust_",
    "_rust_begin_unwind",
    "rust_begin_unwind",
    "tokio::",
    "futures_core::",
    "futures_util::",
];

const WELL_KNOWN_BORDER_FRAMES: &[&str] = &[
    "std::panicking::begin_panic",
    "core::panicking::panic",
    "outpost_core::backtrace_support::current_stacktrace",
    "outpost_core::error::event_from_error",
    "outpost::integrations::panic::",
];

/// Returns the current backtrace as a stacktrace, oldest frame first.
///
/// Frames from the outermost well-known border frame inwards (the panic
/// machinery and the capturing code) are trimmed and every frame is
/// marked in-app unless it belongs to a well-known library.
pub fn current_stacktrace() -> Option<Stacktrace> {
    let mut stacktrace = backtrace_to_stacktrace(&Backtrace::new())?;
    trim_stacktrace(&mut stacktrace);
    mark_in_app(&mut stacktrace);
    (!stacktrace.frames.is_empty()).then_some(stacktrace)
}

fn backtrace_to_stacktrace(bt: &Backtrace) -> Option<Stacktrace> {
    let mut frames: Vec<Frame> = bt
        .frames()
        .iter()
        .flat_map(|frame| {
            // an inlined function yields one symbol per inlined frame
            frame.symbols().iter().map(|sym| {
                let abs_path = sym.filename().map(|p| p.to_string_lossy().into_owned());
                let filename = abs_path.as_deref().map(|p| filename(p).to_owned());
                let function = sym
                    .name()
                    .map(|name| strip_symbol(&name.to_string()).to_owned());
                Frame {
                    function,
                    abs_path,
                    filename,
                    lineno: sym.lineno().map(u64::from),
                    colno: sym.colno().map(u64::from),
                    ..Default::default()
                }
            })
        })
        .collect();
    if frames.is_empty() {
        return None;
    }
    frames.reverse();
    Some(Stacktrace { frames })
}

/// Drops the outermost well-known border frame and everything inside it.
pub fn trim_stacktrace(stacktrace: &mut Stacktrace) {
    let cutoff = stacktrace
        .frames
        .iter()
        .position(|frame| match frame.function {
            Some(ref func) => WELL_KNOWN_BORDER_FRAMES
                .iter()
                .any(|m| function_starts_with(func, m)),
            None => false,
        });

    if let Some(cutoff) = cutoff {
        stacktrace.frames.truncate(cutoff);
    }
}

fn mark_in_app(stacktrace: &mut Stacktrace) {
    for frame in &mut stacktrace.frames {
        if frame.in_app.is_some() {
            continue;
        }
        let in_app = match frame.function {
            Some(ref func) => !WELL_KNOWN_NOT_IN_APP
                .iter()
                .any(|m| function_starts_with(func, m)),
            None => false,
        };
        frame.in_app = Some(in_app);
    }
}

fn filename(s: &str) -> &str {
    s.rsplit(['/', '\\']).next().unwrap_or(s)
}

/// Strips the trailing `::h0123456789abcdef` hash of a symbol.
pub fn strip_symbol(s: &str) -> &str {
    match s.rsplit_once("::h") {
        Some((head, hash))
            if hash.len() == 16 && hash.bytes().all(|b| b.is_ascii_hexdigit()) =>
        {
            head
        }
        _ => s,
    }
}

/// Checks whether the function name starts with the given pattern.
///
/// In trait implementations, the original type name is wrapped in "_< ... >" and colons are
/// replaced with dots. This function accounts for differences while checking.
pub fn function_starts_with(func_name: &str, pattern: &str) -> bool {
    let func_name = func_name.trim_start_matches('<').trim_start_matches("_<");
    if func_name.len() < pattern.len() || !func_name.is_char_boundary(pattern.len()) {
        return false;
    }
    func_name
        .chars()
        .zip(pattern.chars())
        .all(|(f, p)| f == p || f == '.' && p == ':')
}

/// Extracts the type name of an error from its `Debug` output.
pub fn parse_type_from_debug(d: &str) -> &str {
    d.split(&[' ', '(', '{', '\r', '\n'][..])
        .next()
        .map(str::trim)
        .unwrap_or(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(names: &[&str]) -> Stacktrace {
        Stacktrace {
            frames: names
                .iter()
                .map(|name| Frame {
                    function: Some((*name).to_owned()),
                    ..Default::default()
                })
                .collect(),
        }
    }

    #[test]
    fn test_strip_symbol() {
        assert_eq!(
            strip_symbol("app::main::h0123456789abcdef"),
            "app::main"
        );
        assert_eq!(strip_symbol("app::main::helper"), "app::main::helper");
        assert_eq!(strip_symbol("app::hxyz"), "app::hxyz");
    }

    #[test]
    fn test_function_starts_with() {
        assert!(function_starts_with("futures::task_impl::std::set", "futures::"));
        assert!(!function_starts_with("futures::task_impl::std::set", "tokio::"));
        assert!(function_starts_with(
            "_<futures..task_impl..Spawn<T>>::enter",
            "futures::"
        ));
        assert!(!function_starts_with("std", "std::"));
    }

    #[test]
    fn test_trim_and_in_app() {
        let mut stacktrace = frames(&[
            "std::rt::lang_start",
            "app::main",
            "app::handler",
            "core::panicking::panic_fmt",
            "std::panicking::begin_panic_handler",
        ]);
        trim_stacktrace(&mut stacktrace);
        mark_in_app(&mut stacktrace);
        let names: Vec<_> = stacktrace
            .frames
            .iter()
            .map(|f| (f.function.as_deref().unwrap(), f.in_app.unwrap()))
            .collect();
        assert_eq!(
            names,
            [
                ("std::rt::lang_start", false),
                ("app::main", true),
                ("app::handler", true)
            ]
        );
    }

    #[test]
    fn test_parse_type_from_debug() {
        assert_eq!(parse_type_from_debug("NotFound"), "NotFound");
        assert_eq!(
            parse_type_from_debug("Os { code: 2, kind: NotFound }"),
            "Os"
        );
        assert_eq!(parse_type_from_debug("ParseIntError(..)"), "ParseIntError");
    }

    #[test]
    fn test_current_stacktrace_is_trimmed() {
        let stacktrace = current_stacktrace().unwrap();
        for func in stacktrace.frames.iter().filter_map(|f| f.function.as_deref()) {
            assert!(!func.starts_with("backtrace::"), "{func}");
            assert!(!func.starts_with("outpost_core::backtrace_support::current_stacktrace"));
        }
    }
}
