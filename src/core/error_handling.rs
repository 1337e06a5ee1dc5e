//! Generic error handling utilities
//!
//! Every error enum in the crate implements [`ContextualError`] so the
//! binary can decide, without knowing the concrete type, whether to show the
//! error's own message or a generic description of the failed operation.

/// Trait for errors that can distinguish between user-actionable and system errors
///
/// When `is_user_actionable()` returns `true`, `user_message()` must return
/// `Some(message)` with something the operator can act on (fix the config,
/// start the broker). System errors return `false` and `None`; their details
/// only go to the debug log.
pub trait ContextualError: std::error::Error {
    /// Returns true if this error carries a message meant for the operator
    ///
    /// Examples of user-actionable errors:
    /// - Invalid configuration values
    /// - A broker that stayed unreachable through every reconnect attempt
    ///
    /// Examples of system errors:
    /// - A single failed channel operation
    /// - Malformed payloads on the wire
    fn is_user_actionable(&self) -> bool;

    fn user_message(&self) -> Option<&str>;
}

/// Primary line logged for a fatal error
pub fn fatal_message<E: ContextualError + ?Sized>(error: &E, operation_context: &str) -> String {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => format!("FATAL: {}", user_msg),
        _ => format!("FATAL: {}", operation_context),
    }
}

/// Log errors with appropriate detail level based on error specificity
///
/// # Examples
/// ```rust,no_run
/// use courier::broker::BrokerError;
/// use courier::core::error_handling::log_error_with_context;
///
/// // User-actionable: logs "FATAL: Message broker unreachable after repeated reconnect attempts"
/// log_error_with_context(&BrokerError::RetryExhausted { max_retries: 5 }, "Publishing message");
///
/// // System error: logs "FATAL: Publishing message", the cause goes to debug
/// log_error_with_context(&BrokerError::connection("connection refused"), "Publishing message");
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    log::error!("{}", fatal_message(error, operation_context));
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}
