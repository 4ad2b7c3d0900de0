//! Human-readable error descriptions and structured JSON error formatting.

use feeder_core::FeederError;
use feeder_core::error::BuildError;
use feeder_hardware::HwError;

const INVALID_HISTORY_HEADERS: &str = "Invalid headers in history CSV. Expected 'timestamp,cycle,target_weight,actual_weight,duration_secs,alarm,alarm_reason'.";

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(BuildError::InvalidConfig(msg)) = err.downcast_ref::<BuildError>() {
        return format!(
            "What happened: Invalid safety configuration ({msg}).\nLikely causes: Out-of-range [safety] values in the TOML.\nHow to fix: Edit the config file, then rerun."
        );
    }

    if let Some(fe) = err.downcast_ref::<FeederError>() {
        return match fe {
            FeederError::AlarmLatched(reason) => format!(
                "What happened: Feeding stopped on an alarm: {reason}.\nLikely causes: Jammed or empty bin, a stalled actuator, or a runtime limit set too low.\nHow to fix: Check the bins and actuators, then start a new cycle."
            ),
            FeederError::Telemetry(msg) => format!(
                "What happened: The weight indicator could not be read ({msg}).\nLikely causes: Indicator powered off, wrong [indicator] host/port/unit_id, or a network problem.\nHow to fix: Verify the indicator is reachable (`feeder bins`), then retry."
            ),
            FeederError::Hardware(msg) => format!(
                "What happened: An actuator output failed ({msg}).\nLikely causes: Wrong [pins] numbers or missing GPIO permissions.\nHow to fix: Fix the [pins] values and make sure the process may drive GPIO."
            ),
            FeederError::AlreadyActive => {
                "What happened: A feeding cycle is already running.\nHow to fix: Wait for it to finish or stop it first.".to_string()
            }
            FeederError::ManualOverrideRejected => {
                "What happened: Manual actuator control was refused because a cycle is running.\nHow to fix: Stop the cycle first.".to_string()
            }
            FeederError::Storage(msg) if msg.contains("history CSV must have headers") => {
                INVALID_HISTORY_HEADERS.to_string()
            }
            FeederError::InvalidTarget(t) => format!(
                "What happened: Target weight {t} is not valid.\nHow to fix: Pass a target greater than zero."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(hw) = err.downcast_ref::<HwError>() {
        return format!(
            "What happened: Indicator communication failed ({hw}).\nLikely causes: Indicator unreachable or rejecting the request.\nHow to fix: Check [indicator] settings and the network link."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("history csv must have headers") {
        return INVALID_HISTORY_HEADERS.to_string();
    }

    if lower.contains("invalid configuration") || lower.contains("parse config") {
        return format!(
            "What happened: Configuration is invalid.\nDetails: {msg}\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nDetails: {msg}\nHow to fix: Pass --config <FILE> pointing at a readable TOML file."
        );
    }

    if lower.contains("relay") && lower.contains("hardware") {
        return format!("What happened: {msg}");
    }

    // Generic fallback
    format!(
        "Something went wrong.\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: alarm 4, telemetry 3, actuator hardware 5, anything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<FeederError>() {
        Some(FeederError::AlarmLatched(_)) => 4,
        Some(FeederError::Telemetry(_)) => 3,
        Some(FeederError::Hardware(_)) => 5,
        _ if err.downcast_ref::<HwError>().is_some() => 3,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<FeederError>() {
        Some(FeederError::AlarmLatched(_)) => "Alarm",
        Some(FeederError::Telemetry(_)) => "Telemetry",
        Some(FeederError::Hardware(_)) => "Hardware",
        Some(FeederError::AlreadyActive) => "AlreadyActive",
        Some(FeederError::ManualOverrideRejected) => "ManualOverrideRejected",
        Some(FeederError::InvalidTarget(_)) => "InvalidTarget",
        Some(FeederError::Config(_)) => "Config",
        Some(FeederError::Storage(_)) => "Storage",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    });
    if let Some(FeederError::AlarmLatched(alarm)) = err.downcast_ref::<FeederError>() {
        obj["alarm"] = json!(alarm);
    }
    obj.to_string()
}
