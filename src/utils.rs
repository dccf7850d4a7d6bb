//! Endpoint list parsing and loading.

use std::io;
use std::path::Path;
use url::Url;

/// Parse a text blob into `host:port` endpoint strings. Accepts bare
/// `host:port` lines and scheme-prefixed ones; comments and garbage are
/// skipped.
pub fn parse_endpoints(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let bare = match line.find("://") {
                Some(idx) => &line[idx + 3..],
                None => line,
            };
            let url = Url::parse(&format!("socks5://{}", bare)).ok()?;
            let host = url.host_str()?;
            let port = url.port()?;
            Some(format!("{}:{}", host, port))
        })
        .collect()
}

/// Read a proxy list from a text file, one endpoint per line.
pub fn load_proxy_txt(path: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_endpoints(&content))
}
