//! Console logging and panic reporting.

use std::{
    panic::{self, PanicHookInfo},
    sync::{Once, OnceLock},
    thread,
};

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

const DEFAULT_FILTER: &str = "info";

static TRACING_INSTALLED: Once = Once::new();
static PANIC_HOOK_INSTALLED: Once = Once::new();
static FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Installs the console subscriber and the panic hook (idempotent).
///
/// The filter comes from `RUST_LOG`, falling back to `info`. If another global
/// subscriber is already set, only the panic hook is installed.
pub fn install() {
    TRACING_INSTALLED.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let (filter, handle) = reload::Layer::new(filter);
        let console = fmt::layer().with_writer(std::io::stderr).with_target(true);

        if tracing_subscriber::registry().with(filter).with(console).try_init().is_ok() {
            let _ = FILTER.set(handle);
        } else {
            eprintln!("rivulet: a global tracing subscriber is already installed");
        }
    });
    install_panic_hook();
}

/// Replaces the filter of the subscriber set up by [`install`], installing it first if
/// needed. Accepts anything `RUST_LOG` does; invalid directives fall back to `info`.
pub fn set_log_level(directives: &str) {
    install();
    let Some(handle) = FILTER.get() else {
        return;
    };
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|error| {
        tracing::warn!(%error, directives, "invalid log filter");
        EnvFilter::new(DEFAULT_FILTER)
    });
    if let Err(error) = handle.reload(filter) {
        tracing::warn!(%error, "could not update the log filter");
    }
}

fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            report_panic(info);
            previous(info);
        }));
    });
}

fn report_panic(info: &PanicHookInfo<'_>) {
    let message = panic_message(info);
    let thread = thread::current().name().unwrap_or("unnamed").to_owned();
    let location = info
        .location()
        .map(|location| format!("{}:{}:{}", location.file(), location.line(), location.column()));
    tracing::error!(
        target: "rivulet::panic",
        message = %message,
        thread = %thread,
        location = location.as_deref().unwrap_or("unknown"),
        "panicked"
    );
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    if let Some(message) = info.payload().downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        message.clone()
    } else {
        "Unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installing_twice_is_harmless() {
        install();
        install();
        set_log_level("rivulet_core=debug");
        set_log_level("not a [valid filter");
        tracing::debug!("still logging");
    }
}
