//! SDK log processor
//!
//! Diagnostics side-channel: the payload is logged and preserved in the
//! event log by the orchestrator; no storage upsert is produced.

use crate::domain::events::SdkLogCommand;

pub fn process_sdk_log(project_id: &str, command: &SdkLogCommand) {
    tracing::info!(
        project_id = %project_id,
        log = %command.log,
        "SDK log event"
    );
}
