use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::error::{SwitchboardError, SwitchboardResult};
use crate::core::registry::{CommandLogEntry, ConnectionRegistry, ErrorCounter};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    pub message: String,
    pub output: String,
    pub reconnected: bool,
    /// Failure that the reconnect cycle recovered from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_error: Option<String>,
}

/// Flattened `{success, message, output?}` shape handed to API and live clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub reconnected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_error: Option<String>,
}

impl From<SwitchboardResult<CommandOutcome>> for CommandResult {
    fn from(result: SwitchboardResult<CommandOutcome>) -> Self {
        match result {
            Ok(outcome) => CommandResult {
                success: true,
                message: outcome.message,
                output: Some(outcome.output),
                reconnected: outcome.reconnected,
                recovered_error: outcome.recovered_error,
            },
            Err(e) => CommandResult {
                success: false,
                message: e.to_string(),
                output: None,
                reconnected: false,
                recovered_error: None,
            },
        }
    }
}

pub struct CommandDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Runs `command` on a server. A failed attempt gets exactly one forced
    /// reconnect and retry when `auto_reconnect` is set; the second failure is final.
    pub async fn execute(
        &self,
        server_id: i64,
        command: &str,
        auto_reconnect: bool,
    ) -> SwitchboardResult<CommandOutcome> {
        let registry = &self.registry;
        let mut slot = registry.lock(server_id).await;
        let (server, token) = registry
            .ensure_connected_locked(&mut slot, server_id, auto_reconnect)
            .await?;

        let first_error = match registry.transport().execute(&server, &token, command).await {
            Ok(output) => {
                registry.reset_command_errors(server_id).await?;
                registry
                    .append_log(server_id, CommandLogEntry::new(command, &output, true))
                    .await;
                info!(server_id, command, "Command executed on {}", server.name);
                return Ok(CommandOutcome {
                    message: format!("Command executed on {}", server.name),
                    output,
                    reconnected: false,
                    recovered_error: None,
                });
            }
            Err(e) => SwitchboardError::from(e),
        };

        let reason = first_error.to_string();
        warn!(server_id, command, "Command failed on {}: {}", server.name, reason);
        registry
            .append_log(server_id, CommandLogEntry::new(command, &reason, false))
            .await;
        registry
            .record_error(&server, ErrorCounter::Command, &reason)
            .await?;

        if !auto_reconnect || !first_error.is_retryable() {
            return Err(SwitchboardError::DispatchFailure(format!(
                "Command execution failed: {reason}"
            )));
        }

        let (server, token) = match registry.reconnect_locked(&mut slot, server_id).await {
            Ok(session) => session,
            Err(e) => {
                return Err(SwitchboardError::DispatchFailure(format!(
                    "Command execution failed and reconnection failed: {e}"
                )));
            }
        };

        match registry.transport().execute(&server, &token, command).await {
            Ok(output) => {
                registry.reset_command_errors(server_id).await?;
                registry
                    .append_log(
                        server_id,
                        CommandLogEntry::new(command, &output, true).reconnected(),
                    )
                    .await;
                info!(
                    server_id,
                    command, "Command executed on {} after reconnection", server.name
                );
                Ok(CommandOutcome {
                    message: format!("Command executed on {} (after reconnection)", server.name),
                    output,
                    reconnected: true,
                    recovered_error: Some(reason),
                })
            }
            Err(e) => {
                let retry_reason = e.to_string();
                warn!(
                    server_id,
                    command, "Retry after reconnection failed on {}: {}", server.name, retry_reason
                );
                registry
                    .append_log(
                        server_id,
                        CommandLogEntry::new(command, &retry_reason, false).reconnected(),
                    )
                    .await;
                registry
                    .record_error(&server, ErrorCounter::Command, &retry_reason)
                    .await?;
                Err(SwitchboardError::DispatchFailure(format!(
                    "Command execution failed after reconnection: {retry_reason} (first attempt: {reason})"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_flatten_to_unsuccessful_results() {
        let result: CommandResult = Err(SwitchboardError::not_connected()).into();
        assert!(!result.success);
        assert_eq!(result.message, "Server is not connected");
        assert!(result.output.is_none());

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("output").is_none());
    }

    #[test]
    fn successes_carry_output_and_recovery_detail() {
        let result: CommandResult = Ok(CommandOutcome {
            message: "Command executed on db1 (after reconnection)".into(),
            output: "file1.txt".into(),
            reconnected: true,
            recovered_error: Some("broken pipe".into()),
        })
        .into();
        assert!(result.success);
        assert!(result.reconnected);
        assert_eq!(result.output.as_deref(), Some("file1.txt"));
        assert_eq!(result.recovered_error.as_deref(), Some("broken pipe"));
    }
}
