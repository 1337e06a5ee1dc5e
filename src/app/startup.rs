use crate::app::cli::{AppConfig, Args};
use crate::app::commands;
use crate::app::error::AppError;
use crate::core::error_handling::{fatal_message, log_error_with_context};
use crate::core::logging::init_logging;

/// Initialize application startup and run the selected command
///
/// Returns the process exit status.
pub async fn startup(args: Args) -> i32 {
    let command_name = args.command_name();

    // Configuration problems are reported before logging exists
    let config = match AppConfig::resolve(&args).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", fatal_message(&e, "Loading configuration"));
            return 1;
        }
    };

    let logging = match config.logging_options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", fatal_message(&e, "Configuring logging"));
            return 1;
        }
    };
    if let Err(e) = init_logging(&logging) {
        eprintln!("{}", logging_failure(&AppError::from(e)));
        return 1;
    }

    log::info!(
        "{}: courier {} starting ({} backend)",
        command_name,
        crate::core::version::long_version(),
        config.queue.backend
    );

    match commands::run(&config, args.command).await {
        Ok(()) => {
            log::debug!("{}: finished", command_name);
            0
        }
        Err(e) => {
            log_error_with_context(&e, &format!("Running '{}'", command_name));
            1
        }
    }
}

/// Message printed when the logger could not be installed
///
/// There is no logger to carry the cause, so it is appended here.
pub(crate) fn logging_failure(err: &AppError) -> String {
    format!("{}: {}", fatal_message(err, "Initializing logging"), err)
}
