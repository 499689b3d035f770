use std::borrow::Cow;
use std::env;
use std::sync::Arc;

use crate::transports::DefaultTransportFactory;
use crate::types::Dsn;
use crate::ClientOptions;

/// Apply default client options.
///
/// Extends the given `ClientOptions` with default options such as a default
/// transport, a set of default integrations if not requested otherwise, and
/// also sets the `dsn`, `release`, `environment`, and proxy settings based on
/// environment variables.
///
/// When the `default_integrations` option is set to `true` (by default), the
/// following integrations will be added *before* any manually defined
/// integrations, depending on enabled feature flags:
///
/// 1. [`PanicIntegration`] (`feature = "panic"`)
///
/// [`PanicIntegration`]: integrations/panic/struct.PanicIntegration.html
///
/// # Examples
/// ```
/// std::env::set_var("OUTPOST_RELEASE", "release-from-env");
///
/// let options = outpost::ClientOptions::default();
/// assert_eq!(options.release, None);
/// assert!(options.transport.is_none());
///
/// let options = outpost::apply_defaults(options);
/// assert_eq!(options.release, Some("release-from-env".into()));
/// assert!(options.transport.is_some());
/// ```
pub fn apply_defaults(mut opts: ClientOptions) -> ClientOptions {
    if opts.transport.is_none() {
        opts.transport = Some(Arc::new(DefaultTransportFactory));
    }
    if opts.default_integrations {
        // default integrations need to be ordered *before* custom integrations,
        // since they also process events in order
        let mut integrations: Vec<Arc<dyn crate::Integration>> = vec![];
        #[cfg(feature = "panic")]
        {
            integrations.push(Arc::new(
                crate::integrations::panic::PanicIntegration::default(),
            ));
        }
        integrations.extend(opts.integrations);
        opts.integrations = integrations;
    }
    if opts.dsn.is_none() {
        opts.dsn = env::var("OUTPOST_DSN")
            .ok()
            .and_then(|dsn| dsn.parse::<Dsn>().ok());
    }
    if opts.release.is_none() {
        opts.release = env::var("OUTPOST_RELEASE").ok().map(Cow::Owned);
    }
    if opts.environment.is_none() {
        opts.environment = env::var("OUTPOST_ENVIRONMENT")
            .ok()
            .map(Cow::Owned)
            .or_else(|| {
                Some(Cow::Borrowed(if cfg!(debug_assertions) {
                    "debug"
                } else {
                    "release"
                }))
            });
    }
    if opts.server_name.is_none() {
        opts.server_name = server_name().map(Cow::Owned);
    }
    if opts.http_proxy.is_none() {
        opts.http_proxy = env::var("HTTP_PROXY")
            .ok()
            .map(Cow::Owned)
            .or_else(|| env::var("http_proxy").ok().map(Cow::Owned));
    }
    if opts.https_proxy.is_none() {
        opts.https_proxy = env::var("HTTPS_PROXY")
            .ok()
            .map(Cow::Owned)
            .or_else(|| env::var("https_proxy").ok().map(Cow::Owned))
            .or_else(|| opts.http_proxy.clone());
    }
    opts
}

fn server_name() -> Option<String> {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|key| env::var(key).ok())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_values_win() {
        let options = apply_defaults(ClientOptions {
            release: Some("explicit".into()),
            environment: Some("staging".into()),
            default_integrations: false,
            ..Default::default()
        });
        assert_eq!(options.release.as_deref(), Some("explicit"));
        assert_eq!(options.environment.as_deref(), Some("staging"));
        assert!(options.integrations.is_empty());
    }

    #[cfg(feature = "panic")]
    #[test]
    fn test_default_integrations_come_first() {
        struct Custom;
        impl crate::Integration for Custom {}

        let options = apply_defaults(ClientOptions::default().add_integration(Custom));
        let names: Vec<_> = options.integrations.iter().map(|i| i.name()).collect();
        assert_eq!(names.first(), Some(&"panic"));
        assert_eq!(names.len(), 2);
    }
}
