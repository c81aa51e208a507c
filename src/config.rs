use crate::core::{Result, StoreError};

const URL_SCHEME: &str = "kindstore://";

/// Store configuration
///
/// Identifies the project and namespace a client talks to and the limits it
/// enforces on multi-entity calls.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Project the store belongs to
    pub project_id: String,

    /// Namespace within the project; `None` is the default namespace
    pub namespace: Option<String>,

    /// Maximum number of entities in a single multi-entity call
    pub max_batch_size: usize,
}

impl StoreConfig {
    /// Create a new configuration for a project
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            namespace: None,
            max_batch_size: 500,
        }
    }

    /// Set the namespace
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Set the multi-entity batch limit
    pub fn max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    /// Parse from connection string
    ///
    /// Format: "kindstore://project[/namespace]"
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = StoreConfig::from_url("kindstore://my-project/tenant-a")?;
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url.strip_prefix(URL_SCHEME).ok_or_else(|| {
            StoreError::Config(format!("URL must start with '{}'", URL_SCHEME))
        })?;

        let mut parts = rest.splitn(2, '/');
        let project = parts.next().unwrap_or_default();
        if project.is_empty() {
            return Err(StoreError::Config("Missing project id".to_string()));
        }

        let config = Self::new(project);
        match parts.next() {
            Some(namespace) if namespace.contains('/') => Err(StoreError::Config(
                "Invalid namespace format".to_string(),
            )),
            Some(namespace) if !namespace.is_empty() => Ok(config.namespace(namespace)),
            _ => Ok(config),
        }
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{}{}/{}", URL_SCHEME, self.project_id, namespace),
            None => format!("{}{}", URL_SCHEME, self.project_id),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.project_id.is_empty() {
            return Err(StoreError::Config("Project id cannot be empty".to_string()));
        }

        if self.namespace.as_deref() == Some("") {
            return Err(StoreError::Config(
                "Namespace cannot be empty; use None for the default namespace".to_string(),
            ));
        }

        if self.max_batch_size == 0 {
            return Err(StoreError::Config("max_batch_size must be > 0".to_string()));
        }

        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("local")
    }
}
