mod config;
mod observability;
mod stdio;

use anyhow::Context as _;
use apibridge_openapi_tools::{InvocationContext, OpenApiToolSource};
use clap::Parser;
use observability::LogFormat;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(
    name = "apibridge",
    version,
    about = "Serve an OpenAPI-described HTTP API as MCP tools over stdio"
)]
struct Cli {
    /// YAML or JSON source config file.
    #[arg(long, env = "APIBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// API document location (URL or file path). Overrides the config file.
    #[arg(long, env = "APIBRIDGE_SPEC")]
    spec: Option<String>,

    /// Base URL for calls, instead of the document's first server.
    #[arg(long, env = "APIBRIDGE_BASE_URL")]
    base_url: Option<String>,

    /// Tool names or `*` globs to hide. Repeatable or comma-separated.
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Credential forwarded as the `Authorization` header on every call.
    #[arg(long, env = "APIBRIDGE_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, env = "APIBRIDGE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, env = "APIBRIDGE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init_tracing(&cli.log_level, cli.log_format);

    let cfg = config::resolve(
        cli.config.as_deref(),
        config::Overrides {
            spec: cli.spec,
            base_url: cli.base_url,
            exclude: cli.exclude,
        },
    )?;

    tracing::info!(spec = %cfg.spec, "starting apibridge");
    let spec = cfg.spec.clone();
    let source = OpenApiToolSource::build(cfg)
        .await
        .with_context(|| format!("failed to load API document '{spec}'"))?;

    let ctx = cli
        .auth_token
        .map(InvocationContext::with_authorization)
        .unwrap_or_default();

    let server = stdio::ApiBridgeServer::new(Arc::new(source), ctx);
    let (stdin, stdout) = rmcp::transport::stdio();
    stdio::serve(server, stdin, stdout).await?;

    tracing::info!("shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn exclude_accepts_lists_and_repeats() {
        let cli = Cli::try_parse_from([
            "apibridge",
            "--spec",
            "api.yaml",
            "--exclude",
            "a,b",
            "--exclude",
            "c*",
            "--log-format",
            "json",
        ])
        .expect("parse");
        assert_eq!(cli.exclude, vec!["a", "b", "c*"]);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.spec.as_deref(), Some("api.yaml"));
    }
}
