/// Returns the intended release as an `Option<Cow<'static, str>>`.
///
/// This can be used with `ClientOptions` to set the release name.  It uses
/// the information supplied by cargo to calculate a release.
///
/// # Examples
///
/// ```
/// let options = outpost_core::ClientOptions {
///     release: outpost_core::release_name!(),
///     ..Default::default()
/// };
/// assert!(options.release.is_some());
/// ```
#[macro_export]
macro_rules! release_name {
    () => {{
        static RELEASE: ::std::sync::LazyLock<Option<String>> = ::std::sync::LazyLock::new(|| {
            option_env!("CARGO_PKG_NAME").and_then(|name| {
                option_env!("CARGO_PKG_VERSION").map(|version| format!("{}@{}", name, version))
            })
        });
        RELEASE
            .as_deref()
            .map(|release| ::std::borrow::Cow::Borrowed(release))
    }};
}

/// Emits an SDK diagnostic through `tracing` under the `outpost` target.
#[macro_export]
#[doc(hidden)]
macro_rules! outpost_debug {
    ($($arg:tt)*) => {
        $crate::__tracing::debug!(target: "outpost", $($arg)*)
    };
}
