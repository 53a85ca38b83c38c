//! CLI command runner.
//!
//! Dispatches one parsed command to the controller and prints its result.

use anyhow::Result;
use serde::Serialize;

use crate::error::QuestError;
use crate::swap::units::format_units;
use crate::swap::PreparedSwap;

use super::args::{Command, SwapArgs};
use super::bootstrap::CliContext;
use super::output::{print_error, print_result, run_event_loop};

/// Execute the command in `ctx.args`.
///
/// Controller failures are printed with their classification and returned as
/// errors so the process exits non-zero.
pub async fn execute(ctx: &CliContext) -> Result<()> {
    let json_mode = ctx.args.json;
    let events = ctx
        .args
        .verbose
        .then(|| tokio::spawn(run_event_loop(ctx.controller.subscribe(), json_mode)));

    let result = dispatch(ctx, &ctx.args.command).await;

    if let Some(handle) = events {
        // Let already-emitted events drain before stopping the printer
        tokio::task::yield_now().await;
        handle.abort();
    }

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            print_error(json_mode, &e)?;
            Err(anyhow::Error::new(e))
        }
    }
}

async fn dispatch(ctx: &CliContext, command: &Command) -> Result<(), QuestError> {
    let controller = &ctx.controller;
    let json_mode = ctx.args.json;

    match command {
        Command::Status => {
            let status = controller.status();
            let mut lines = vec![
                format!("host:    {}", status.host_state),
                format!("session: {}", status.session_state),
            ];
            if let Some(address) = status.address {
                lines.push(format!("address: {}", address));
            }
            if let Some(user) = &status.user {
                lines.push(format!(
                    "user:    {} (verified: {})",
                    user.username.as_deref().unwrap_or(&user.id),
                    user.is_verified
                ));
            }
            emit(json_mode, "status", &status, &lines)
        }
        Command::Login => {
            let session = controller.connect_wallet().await?;
            let lines = vec![format!("Signed in as {}", session.address)];
            emit(json_mode, "session", &session, &lines)
        }
        Command::Logout => {
            controller.disconnect();
            emit(json_mode, "status", &controller.status(), &["Signed out".to_string()])
        }
        Command::Quote(args) => {
            let prepared = prepare(ctx, args).await?;
            let lines = describe_quote(&prepared);
            emit(json_mode, "quote", &prepared, &lines)
        }
        Command::Swap(args) => {
            let prepared = prepare(ctx, args).await?;
            let receipt = controller.execute_swap(&prepared.request).await?;
            let mut lines = describe_quote(&prepared);
            if let Some(approval) = &receipt.approval_transaction_id {
                lines.push(format!("Approval:  {}", approval));
            }
            lines.push(format!("Settled:   {}", receipt.transaction_id));
            emit(json_mode, "receipt", &receipt, &lines)
        }
        Command::Deposit { amount, token } => {
            let receipt = controller.deposit(amount, token).await?;
            let lines = vec![format!(
                "Deposited {} {} ({})",
                receipt.amount,
                receipt.token.symbol(),
                receipt.transaction_id
            )];
            emit(json_mode, "deposit", &receipt, &lines)
        }
        Command::Verify => {
            let proof = controller.verify_human().await?;
            let lines = vec![format!("Verified ({})", proof.verification_level)];
            emit(json_mode, "verification", &proof, &lines)
        }
        Command::Sign { message } => {
            let signed = controller.sign_message(message).await?;
            let lines = vec![format!("Signature: {}", signed.signature)];
            emit(json_mode, "signature", &signed, &lines)
        }
        Command::Config { .. } => Err(QuestError::InvalidInput(
            "config commands run without a controller".to_string(),
        )),
    }
}

async fn prepare(ctx: &CliContext, args: &SwapArgs) -> Result<PreparedSwap, QuestError> {
    ctx.controller
        .prepare_swap(&args.from, &args.to, &args.amount, args.slippage_bps)
        .await
}

fn describe_quote(prepared: &PreparedSwap) -> Vec<String> {
    let quote = &prepared.quote;
    let (token_in, token_out) = (&prepared.token_in, &prepared.token_out);
    vec![
        format!(
            "Swap:      {} {} -> {} {}",
            format_units(quote.amount_in, token_in.decimals),
            token_in.symbol,
            format_units(quote.amount_out, token_out.decimals),
            token_out.symbol
        ),
        format!(
            "Minimum:   {} {} ({} bps slippage)",
            format_units(quote.minimum_amount_out, token_out.decimals),
            token_out.symbol,
            quote.slippage_bps
        ),
    ]
}

fn emit<T: Serialize>(json_mode: bool, kind: &str, value: &T, lines: &[String]) -> Result<(), QuestError> {
    print_result(json_mode, kind, value, lines)
        .map_err(|e| QuestError::Unknown(format!("failed to write output: {}", e)))
}
