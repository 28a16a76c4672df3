use crate::protocol::AgentError;

pub const URL_PREFIX: &str = "jdbc:agent:";

/// Where the server for a catalog lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddress {
    /// `host:port`, used as is
    Direct(String),
    /// Directory servers to ask for the catalog's `host:port`
    Directory(Vec<String>),
}

/// Parsed `jdbc:agent:<address>/<catalog>` connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUrl {
    pub address: ServerAddress,
    pub catalog: String,
}

impl ConnectionUrl {
    /// A single `host:port` pair addresses the server directly; anything else
    /// (a comma-separated list, or names without a port) is a directory list.
    pub fn parse(url: &str) -> Result<Self, AgentError> {
        let rest = url
            .strip_prefix(URL_PREFIX)
            .ok_or_else(|| AgentError::InvalidUrl(format!("expected '{}' prefix: {}", URL_PREFIX, url)))?;

        let (address, catalog) = rest
            .rsplit_once('/')
            .ok_or_else(|| AgentError::InvalidUrl(format!("missing catalog: {}", url)))?;

        let catalog = catalog.trim();
        if catalog.is_empty() {
            return Err(AgentError::InvalidUrl(format!("empty catalog: {}", url)));
        }

        let servers: Vec<String> = address
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let address = match servers.as_slice() {
            [] => return Err(AgentError::InvalidUrl(format!("missing address: {}", url))),
            [single] if is_host_port(single) => ServerAddress::Direct(single.clone()),
            _ => ServerAddress::Directory(servers),
        };

        Ok(Self {
            address,
            catalog: catalog.to_string(),
        })
    }
}

fn is_host_port(s: &str) -> bool {
    match s.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_address() {
        let url = ConnectionUrl::parse("jdbc:agent:127.0.0.1:10101/example").unwrap();
        assert_eq!(url.address, ServerAddress::Direct("127.0.0.1:10101".to_string()));
        assert_eq!(url.catalog, "example");
    }

    #[test]
    fn test_directory_address() {
        let url = ConnectionUrl::parse("jdbc:agent:zkServers/example").unwrap();
        assert_eq!(url.address, ServerAddress::Directory(vec!["zkServers".to_string()]));

        let url = ConnectionUrl::parse("jdbc:agent:zk1:2181,zk2:2181/mytest").unwrap();
        assert_eq!(
            url.address,
            ServerAddress::Directory(vec!["zk1:2181".to_string(), "zk2:2181".to_string()])
        );
        assert_eq!(url.catalog, "mytest");
    }

    #[test]
    fn test_rejects_bad_urls() {
        assert!(ConnectionUrl::parse("jdbc:mysql://localhost/db").is_err());
        assert!(ConnectionUrl::parse("jdbc:agent:127.0.0.1:10101").is_err());
        assert!(ConnectionUrl::parse("jdbc:agent:127.0.0.1:10101/").is_err());
        assert!(ConnectionUrl::parse("jdbc:agent:/example").is_err());
    }
}
