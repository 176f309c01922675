//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Parses command-specific arguments into engine types
//! 2. Calls the engine
//! 3. Formats and displays output
//!
//! # Async Commands
//!
//! Every command except `completion` talks to the service. `dispatch` builds
//! one tokio runtime and blocks on the handler.

mod completion;
mod contents;
mod diff_cmd;
mod log_cmd;
mod mutation;
mod references;

pub use completion::completion;

use anyhow::{anyhow, Context as _, Result};
use serde_json::json;
use tracing::debug;

use crate::api::ApiError;
use crate::cli::args::Command;
use crate::cli::Context;
use crate::core::config::Config;
use crate::core::types::{CommitHash, ContentKey, RefSpec, ReferenceName};
use crate::engine::Client;
use crate::ui::output;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    if let Command::Completion { shell } = command {
        return completion::completion(shell);
    }
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(dispatch_async(command, ctx))
}

async fn dispatch_async(command: Command, ctx: &Context) -> Result<()> {
    let client = connect(ctx)?;
    match command {
        Command::Refs { filter } => references::refs(&client, ctx, filter).await,
        Command::Show { name } => references::show(&client, ctx, &name).await,
        Command::Create { kind, name, from } => {
            references::create(&client, ctx, kind.into(), &name, from.as_deref()).await
        }
        Command::Assign {
            kind,
            name,
            expected,
            to,
        } => references::assign(&client, ctx, kind.into(), &name, &expected, &to).await,
        Command::Delete {
            kind,
            name,
            expected,
        } => references::delete(&client, ctx, kind.into(), &name, &expected).await,
        Command::Log {
            reference,
            max_count,
            until,
            filter,
        } => log_cmd::log(&client, ctx, reference.as_deref(), max_count, until, filter).await,
        Command::Diff { from, to } => diff_cmd::diff(&client, ctx, &from, &to).await,
        Command::Contents { reference, prefix } => {
            contents::contents(&client, ctx, reference.as_deref(), prefix.as_deref()).await
        }
        Command::Get { reference, keys } => contents::get(&client, ctx, &reference, &keys).await,
        Command::Commit {
            branch,
            expected,
            message,
            author,
            puts,
            deletes,
        } => {
            let args = mutation::CommitArgs {
                branch,
                expected,
                message,
                author,
                puts,
                deletes,
            };
            mutation::commit(&client, ctx, args).await
        }
        Command::Merge {
            from,
            into,
            expected,
            message,
            dry_run,
        } => mutation::merge(&client, ctx, &from, &into, &expected, message, dry_run).await,
        Command::Transplant {
            hashes,
            from,
            into,
            expected,
            message,
            dry_run,
        } => {
            let args = mutation::TransplantArgs {
                hashes,
                from,
                into,
                expected,
                message,
                dry_run,
            };
            mutation::transplant(&client, ctx, args).await
        }
        Command::Completion { shell } => completion::completion(shell),
    }
}

/// Build a client from the config file, environment and flags.
fn connect(ctx: &Context) -> Result<Client> {
    let loaded = Config::load()?;
    for warning in &loaded.warnings {
        output::warn(
            format!("{} ({})", warning.message, warning.path.display()),
            ctx.verbosity,
        );
    }
    let config = loaded.config.client_config(&ctx.overrides)?;
    debug!(
        uri = %config.base_url(),
        page_size = config.page_size(),
        config_file = ?loaded.config.loaded_from(),
        "connecting"
    );
    Ok(Client::new(config)?)
}

pub(crate) fn parse_name(s: &str) -> Result<ReferenceName> {
    ReferenceName::new(s).with_context(|| format!("invalid reference name '{}'", s))
}

pub(crate) fn parse_hash(s: &str) -> Result<CommitHash> {
    CommitHash::new(s).with_context(|| format!("invalid commit hash '{}'", s))
}

pub(crate) fn parse_ref(s: &str) -> Result<RefSpec> {
    s.parse::<RefSpec>().map_err(|e| anyhow!(e))
}

pub(crate) fn parse_key(s: &str) -> Result<ContentKey> {
    s.parse::<ContentKey>()
        .with_context(|| format!("invalid content key '{}'", s))
}

/// The given reference, or the configured default branch.
pub(crate) fn ref_or_default(client: &Client, reference: Option<&str>) -> Result<RefSpec> {
    match reference {
        Some(s) => parse_ref(s),
        None => Ok(RefSpec::named(client.config().default_branch().clone())),
    }
}

/// Show what a failed mutation left behind, then hand the error back.
pub(crate) fn report_failure(ctx: &Context, error: ApiError) -> anyhow::Error {
    if ctx.json {
        let mut body = json!({
            "error": error.to_string(),
            "conflicts": error.conflicts(),
        });
        if let ApiError::PartialApplication(partial) = &error {
            body["applied"] = json!(partial.applied);
            body["failedAt"] = json!(partial.failed_at);
            body["currentHash"] = json!(partial.current_hash);
        }
        if let Err(e) = output::json(&body) {
            return e;
        }
        return error.into();
    }

    if let Some(report) = error.conflicts() {
        output::detail(output::format_conflicts(report), ctx.verbosity);
    }
    if let ApiError::PartialApplication(partial) = &error {
        output::detail(
            format!(
                "applied [{}]; target is now at {}",
                output::format_hashes(&partial.applied),
                partial.current_hash
            ),
            ctx.verbosity,
        );
    }
    error.into()
}
