use anyhow::Context;
use serde_json::Value;
use stdio_service::service::types::Notification;
use stdio_service::{ProtocolHandler, ServiceOptions, StdioService};

use crate::cli::Config;

/// Prints everything the backend says to stdout, one line per message.
struct ConsoleHandler;

impl ProtocolHandler for ConsoleHandler {
    type Notification = Notification;

    fn should_handle_message(&self, message: &str) -> bool {
        stdio_service::service::looks_like_json(message)
    }

    fn handle_notification(&self, notification: Notification) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string(&notification)?);
        Ok(())
    }

    fn process_unhandled_message(&self, message: &str) {
        println!("{}", message);
    }
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let mut options = ServiceOptions::new()
        .with_wrapped_messages(config.wrapped)
        .with_treat_handling_errors_as_unhandled(config.tolerant);
    if let Some(path) = &config.log_file {
        options = options.with_log_file(path.clone());
    }

    let service = StdioService::spawn(
        ConsoleHandler,
        options,
        config.working_dir.as_deref(),
        &config.program,
        &config.args,
    )
    .with_context(|| format!("failed to start {}", config.program))?;

    let _server_errors = service.register_for_request_error(|error| {
        tracing::error!(method = ?error.method, "server error: {}", error);
    });

    let outcome = match &config.method {
        Some(method) => request_once(&service, method, config.params.clone()).await,
        None => wait_for_exit(&service).await,
    };

    service.dispose();
    outcome
}

async fn request_once(
    service: &StdioService<ConsoleHandler>,
    method: &str,
    params: Value,
) -> anyhow::Result<()> {
    let params = match params {
        Value::Null => None,
        params => Some(params),
    };

    let result = tokio::select! {
        result = service.send_request_value(method, params) => result,
        _ = tokio::signal::ctrl_c() => anyhow::bail!("interrupted while waiting for `{}`", method),
    };

    let result = result.with_context(|| format!("request `{}` failed", method))?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn wait_for_exit(service: &StdioService<ConsoleHandler>) -> anyhow::Result<()> {
    let Some(process) = service.process() else {
        return Ok(());
    };

    tokio::select! {
        status = process.wait() => {
            match status {
                Some(status) if !status.success() => anyhow::bail!("backend exited with {}", status),
                _ => Ok(()),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, stopping backend");
            Ok(())
        }
    }
}
