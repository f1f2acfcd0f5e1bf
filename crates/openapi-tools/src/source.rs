//! [`OpenApiToolSource`]: one API document exposed as a set of MCP tools.

use crate::catalog::{LoadedCatalog, ToolCatalogBuilder, ToolDescriptor};
use crate::config::ApiSourceConfig;
use crate::dispatch::{CallParameters, CallReport, Dispatcher, InvocationContext};
use crate::error::{OpenApiToolsError, Result};
use crate::loader::SpecLoader;
use rmcp::model::{CallToolResult, Content, Tool};
use serde_json::{Value, json};
use std::sync::{Arc, OnceLock};

pub struct OpenApiToolSource {
    config: ApiSourceConfig,
    loader: SpecLoader,
    dispatcher: Dispatcher,
    /// Set once by [`Self::start`]; read-only afterwards.
    catalog: OnceLock<Arc<LoadedCatalog>>,
}

impl OpenApiToolSource {
    /// Create a source. Nothing is fetched until [`Self::start`].
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::Config`] if the HTTP client cannot be built.
    pub fn new(config: ApiSourceConfig) -> Result<Self> {
        let client = config
            .outbound
            .client_builder()
            .build()
            .map_err(|e| OpenApiToolsError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            loader: SpecLoader::new(client.clone(), &config),
            dispatcher: Dispatcher::new(client, &config),
            config,
            catalog: OnceLock::new(),
        })
    }

    /// Create and start a source in one step.
    ///
    /// # Errors
    ///
    /// See [`Self::new`] and [`Self::start`].
    pub async fn build(config: ApiSourceConfig) -> Result<Self> {
        let source = Self::new(config)?;
        source.start().await?;
        Ok(source)
    }

    /// Load the document and build the catalog, bounded by the startup timeout. Calling
    /// it again after a successful start is a no-op.
    ///
    /// # Errors
    ///
    /// Load errors, [`OpenApiToolsError::Config`], or [`OpenApiToolsError::Startup`] on
    /// timeout.
    pub async fn start(&self) -> Result<()> {
        if self.catalog.get().is_some() {
            return Ok(());
        }

        let timeout = self.config.startup_timeout();
        let startup = async {
            let doc = self.loader.load().await?;
            let catalog = ToolCatalogBuilder::new(self.config.exclude.clone()).build(&doc);
            Ok::<_, OpenApiToolsError>(catalog)
        };

        let catalog = match tokio::time::timeout(timeout, startup).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(OpenApiToolsError::Startup(format!(
                    "loading '{}' did not finish within {}s",
                    self.loader.location(),
                    timeout.as_secs()
                )));
            }
        };

        tracing::info!(
            spec = %self.loader.location(),
            tools = catalog.len(),
            "OpenAPI tool source ready"
        );
        // A concurrent start may have won; either catalog is equivalent.
        let _ = self.catalog.set(Arc::new(catalog));
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &ApiSourceConfig {
        &self.config
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.catalog.get().is_some()
    }

    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::SpecNotLoaded`] before a successful start.
    pub fn catalog(&self) -> Result<Arc<LoadedCatalog>> {
        self.catalog
            .get()
            .cloned()
            .ok_or(OpenApiToolsError::SpecNotLoaded)
    }

    /// MCP tools, empty before start.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.catalog
            .get()
            .map(|c| c.descriptors().map(ToolDescriptor::to_mcp_tool).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.catalog
            .get()
            .map(|c| c.descriptors().cloned().collect())
            .unwrap_or_default()
    }

    /// Decode, validate and dispatch one invocation.
    ///
    /// # Errors
    ///
    /// [`OpenApiToolsError::SpecNotLoaded`], [`OpenApiToolsError::ToolNotFound`],
    /// [`OpenApiToolsError::Validation`] or [`OpenApiToolsError::Call`].
    pub async fn try_call_tool(&self, name: &str, arguments: Value, ctx: &InvocationContext) -> Result<CallReport> {
        let catalog = self.catalog()?;
        if catalog.lookup(name).is_none() {
            return Err(OpenApiToolsError::ToolNotFound(name.to_string()));
        }
        let params = CallParameters::from_arguments(arguments)?;
        self.dispatcher.dispatch(&catalog, name, &params, ctx).await
    }

    /// [`Self::try_call_tool`] with every error turned into an error result.
    pub async fn call_tool(&self, name: &str, arguments: Value, ctx: &InvocationContext) -> CallToolResult {
        match self.try_call_tool(name, arguments, ctx).await {
            Ok(report) => CallToolResult::success(vec![Content::text(report.to_text())]),
            Err(OpenApiToolsError::Validation(details)) => {
                tracing::debug!(tool = %name, violations = details.len(), "rejected invalid arguments");
                validation_result(details)
            }
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "tool call failed");
                CallToolResult::error(vec![Content::text(e.to_string())])
            }
        }
    }
}

/// `{ "error": "Validation failed", "details": [...] }` as both text and structured
/// content.
fn validation_result(details: Vec<String>) -> CallToolResult {
    let payload = json!({ "error": "Validation failed", "details": details });
    let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
    CallToolResult {
        content: vec![Content::text(text)],
        structured_content: Some(payload),
        is_error: Some(true),
        meta: None,
    }
}
