//! Custom macros for reducing code repetition in camsyncd

/// Log a per-stream failure as a warning and continue (non-fatal error handling)
///
/// # Example
/// ```
/// warn_and_continue!(adapter.play().await, id, "start playback");
/// ```
#[macro_export]
macro_rules! warn_and_continue {
    ($expr:expr, $id:expr, $context:expr) => {
        if let Err(e) = $expr {
            log::warn!("[{}] Failed to {}: {}", $id, $context, e);
        }
    };
}

/// Validate an enum-like string value
///
/// # Example
/// ```
/// validate_enum!(level, "trace", "debug", "info", "warn", "error");
/// ```
#[macro_export]
macro_rules! validate_enum {
    ($value:expr, $($variant:expr),+) => {
        match $value {
            $($variant)|+ => Ok(()),
            _ => anyhow::bail!("Invalid value: {} (expected one of: {})", $value, [$($variant),+].join(", ")),
        }
    };
}
