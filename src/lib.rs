/*!
`campus` is the backend of a departmental college administration system:
users register, wait for approval, and then work with attendance,
timetables, exams, results, assignments, notifications, and leave
requests, all of it scoped by role and department.
*/
use time::{format_description::FormatItem, macros::format_description, Date};

pub mod auth;
pub mod config;
pub mod error;
pub mod inter;
pub mod policy;
pub mod store;
pub mod user;

/// Calendar-day format used on the wire, in query parameters, and in logs.
pub static DATE_FMT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

time::serde::format_description!(date_fmt, Date, "[year]-[month]-[day]");

pub fn log_level_from_env() -> simplelog::LevelFilter {
    use simplelog::LevelFilter;

    let mut level_string = match std::env::var("LOG_LEVEL") {
        Err(_) => { return LevelFilter::Warn; },
        Ok(s) => s,
    };

    level_string.make_ascii_lowercase();
    match level_string.as_str() {
        "max" => LevelFilter::max(),
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Warn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn ensure_logging() {
        use simplelog::{ColorChoice, TermLogger, TerminalMode};
        let log_cfg = simplelog::ConfigBuilder::new()
            .add_filter_allow_str("campus")
            .build();
        let res = TermLogger::init(
            log_level_from_env(),
            log_cfg,
            TerminalMode::Stdout,
            ColorChoice::Auto
        );

        match res {
            Ok(_) => { log::info!("Test logging started."); },
            Err(_) => { log::info!("Test logging already started."); },
        }
    }
}
