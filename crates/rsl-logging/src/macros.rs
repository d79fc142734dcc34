//! ---
//! rsl_section: "03-persistence-logging"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Structured logging adapters and sinks."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---

#[doc(hidden)]
#[macro_export]
macro_rules! __station_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            station = ctx.station.unwrap_or_default(),
            platform = ctx.platform.unwrap_or(""),
            operation = ctx.operation.unwrap_or(""),
            stage = ctx.stage.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with station context.
#[macro_export]
macro_rules! station_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__station_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__station_event!(tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with station context.
#[macro_export]
macro_rules! station_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__station_event!(tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__station_event!(tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with station context.
#[macro_export]
macro_rules! station_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__station_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__station_event!(tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with station context.
#[macro_export]
macro_rules! station_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__station_event!(tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__station_event!(tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
