const fn unwrap_or_cargo_version(opt: Option<&'static str>) -> &'static str {
    match opt {
        Some(val) => val,
        None => env!("CARGO_PKG_VERSION"),
    }
}

/// Release version, overridable at build time through `NETCHECK_VERSION`.
pub const VERSION: &str = unwrap_or_cargo_version(option_env!("NETCHECK_VERSION"));

/// `User-Agent` sent when fetching bundles over HTTP.
pub fn user_agent() -> String {
    format!("netcheck/{VERSION}")
}
