// Macros file - tracing macros are referenced by full path inside the definitions

/// Standardized logging macros so every layer emits the same field names
/// (`operation`, `user_id`, `quiz_id`, `session_id`, `component`) and message
/// shapes.

// ============================================================================
// API Operation Logging Macros
// ============================================================================

/// Log the start of an API operation
#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, user_id = $user_id:expr) => {
        tracing::debug!(
            operation = $operation,
            user_id = %$user_id,
            "API operation started"
        );
    };
    ($operation:expr, quiz_id = $quiz_id:expr) => {
        tracing::debug!(
            operation = $operation,
            quiz_id = %$quiz_id,
            "API operation started"
        );
    };
    ($operation:expr, session_id = $session_id:expr) => {
        tracing::debug!(
            operation = $operation,
            session_id = %$session_id,
            "API operation started"
        );
    };
    ($operation:expr) => {
        tracing::debug!(operation = $operation, "API operation started");
    };
}

/// Log successful completion of an API operation
#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, user_id = $user_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            user_id = %$user_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, quiz_id = $quiz_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            quiz_id = %$quiz_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, session_id = $session_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            session_id = %$session_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            count = $count,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::info!(operation = $operation, "API operation completed: {}", $msg);
    };
}

/// Log API warnings with context
#[macro_export]
macro_rules! log_api_warn {
    ($operation:expr, session_id = $session_id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            session_id = %$session_id,
            "API operation warning: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::warn!(operation = $operation, "API operation warning: {}", $msg);
    };
}

// ============================================================================
// Service Layer Logging Macros
// ============================================================================

#[macro_export]
macro_rules! log_service_start {
    ($service:expr, $operation:expr, user_id = $user_id:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            user_id = %$user_id,
            "Service operation started"
        );
    };
    ($service:expr, $operation:expr, quiz_id = $quiz_id:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            quiz_id = %$quiz_id,
            "Service operation started"
        );
    };
    ($service:expr, $operation:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            "Service operation started"
        );
    };
}

#[macro_export]
macro_rules! log_service_success {
    ($service:expr, $operation:expr, quiz_id = $quiz_id:expr, score = $score:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            quiz_id = %$quiz_id,
            score = $score,
            "Service operation completed successfully"
        );
    };
    ($service:expr, $operation:expr, count = $count:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            count = $count,
            duration_ms = $duration,
            "Service operation completed successfully"
        );
    };
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            "Service operation completed: {}", $msg
        );
    };
}

#[macro_export]
macro_rules! log_service_error {
    ($service:expr, $operation:expr, error = $error:expr) => {
        tracing::error!(
            service = $service,
            operation = $operation,
            error = %$error,
            "Service operation failed"
        );
    };
}

#[macro_export]
macro_rules! log_service_warn {
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::warn!(
            service = $service,
            operation = $operation,
            "Service warning: {}",
            $msg
        );
    };
}

// ============================================================================
// Storage Logging Macros
// ============================================================================

/// Log key-value store reads and writes
#[macro_export]
macro_rules! log_store_operation {
    (debug, $operation:expr, key = $key:expr, bytes = $bytes:expr) => {
        tracing::debug!(
            component = "storage",
            operation = $operation,
            key = %$key,
            bytes = $bytes,
            "Storage operation completed"
        );
    };
    (info, $operation:expr, $msg:expr) => {
        tracing::info!(
            component = "storage",
            operation = $operation,
            "Storage operation: {}", $msg
        );
    };
    (warn, $operation:expr, key = $key:expr, error = $error:expr) => {
        tracing::warn!(
            component = "storage",
            operation = $operation,
            key = %$key,
            error = %$error,
            "Malformed stored value, resetting to empty"
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

// ============================================================================
// Validation Logging Macros
// ============================================================================

#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}
