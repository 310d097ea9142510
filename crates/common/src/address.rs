/// Splits a `host[:port]` address into its host and optional port.
///
/// Bracketed IPv6 literals (`[::1]:443`) are unwrapped; a bare IPv6 literal
/// with several colons and no brackets is taken as a host without a port.
pub fn split_host_port(address: &str) -> (&str, Option<&str>) {
    if let Some(rest) = address.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').filter(|port| !port.is_empty());
            return (host, port);
        }
    }
    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            (host, Some(port).filter(|port| !port.is_empty()))
        }
        _ => (address, None),
    }
}
