use std::sync::Arc;
use std::time::Duration;

use super::{AgentDriver, ConnectProperties, DirectoryLookup, RemoteConnection};
use crate::protocol::AgentError;

/// Fluent construction of a single remote connection
pub struct ConnectionBuilder {
    url: String,
    props: ConnectProperties,
    directory: Option<Arc<dyn DirectoryLookup>>,
    driver: Option<Arc<AgentDriver>>,
}

impl ConnectionBuilder {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            props: ConnectProperties::default(),
            directory: None,
            driver: None,
        }
    }

    pub fn auth(mut self, user: &str, password: &str) -> Self {
        self.props.user = Some(user.to_string());
        self.props.password = Some(password.to_string());
        self
    }

    /// Server-side idle timeout for the session
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.props.idle_timeout = Duration::from_millis(ms);
        self
    }

    pub fn call_timeout_ms(mut self, ms: u64) -> Self {
        self.props.call_timeout = Duration::from_millis(ms);
        self
    }

    pub fn lookup_timeout_ms(mut self, ms: u64) -> Self {
        self.props.lookup_timeout = Duration::from_millis(ms);
        self
    }

    pub fn fetch_size(mut self, rows: usize) -> Self {
        self.props.fetch_size = rows.max(1);
        self
    }

    pub fn properties(mut self, props: ConnectProperties) -> Self {
        self.props = props;
        self
    }

    pub fn directory(mut self, directory: Arc<dyn DirectoryLookup>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Reuse an existing driver and its cached links. Takes precedence over
    /// [`ConnectionBuilder::directory`].
    pub fn driver(mut self, driver: Arc<AgentDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub async fn connect(self) -> Result<RemoteConnection, AgentError> {
        let driver = match (self.driver, self.directory) {
            (Some(driver), _) => driver,
            (None, Some(directory)) => Arc::new(AgentDriver::with_directory(directory)),
            (None, None) => Arc::new(AgentDriver::new()),
        };
        driver.connect(&self.url, &self.props).await
    }
}
