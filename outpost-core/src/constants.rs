use std::sync::LazyLock;

use crate::protocol::ClientSdkInfo;

/// The version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name the SDK reports itself under.
pub const SDK_NAME: &str = "outpost.rust";

pub(crate) static USER_AGENT: LazyLock<String> =
    LazyLock::new(|| format!("{SDK_NAME}/{VERSION}"));

pub(crate) static SDK_INFO: LazyLock<ClientSdkInfo> = LazyLock::new(|| ClientSdkInfo {
    name: SDK_NAME.into(),
    version: VERSION.into(),
    integrations: Vec::new(),
});
