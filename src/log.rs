//! Thin logging facade. Subsystems call these instead of reaching for
//! the `log` crate macros directly, so the call sites read the same
//! whether or not a concrete logger is installed by the host binary.

pub(crate) fn trace(msg: &str) {
    ::log::trace!("{msg}");
}

pub(crate) fn info(msg: &str) {
    ::log::info!("{msg}");
}

pub(crate) fn warn(msg: &str) {
    ::log::warn!("{msg}");
}

pub(crate) fn error(msg: &str) {
    ::log::error!("{msg}");
}
