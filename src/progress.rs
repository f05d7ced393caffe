//! Progress reporting callbacks

use crate::error::{Error, Result};

/// Progress callback: receives the completed fraction in `[0, 1]` and a
/// message, returns `false` to request a stop.
pub type ProgressFn<'a> = &'a (dyn Fn(f64, &str) -> bool + 'a);

/// Invokes `progress` (when present) and turns a stop request into an error
pub(crate) fn check(progress: Option<ProgressFn<'_>>, fraction: f64, message: &str) -> Result<()> {
    match progress {
        Some(callback) if !callback(fraction, "") => Err(Error::UserCancelled(message.to_string())),
        _ => Ok(()),
    }
}

/// Maps a sub-task's `[0, 1]` progress into `[min, max]` of `parent`
pub fn scaled<'a>(
    min: f64,
    max: f64,
    parent: Option<ProgressFn<'a>>,
) -> impl Fn(f64, &str) -> bool + 'a {
    move |fraction: f64, message: &str| match parent {
        Some(callback) => callback(min + fraction * (max - min), message),
        None => true,
    }
}

/// Progress callback that never stops and prints nothing
pub fn dummy(_fraction: f64, _message: &str) -> bool {
    true
}

/// Logs progress in ten-percent steps through `tracing`
pub fn term_progress() -> impl Fn(f64, &str) -> bool {
    let last = std::sync::atomic::AtomicUsize::new(0);
    move |fraction: f64, message: &str| {
        let step = (fraction.clamp(0.0, 1.0) * 10.0) as usize;
        if step > last.swap(step, std::sync::atomic::Ordering::Relaxed) || fraction == 0.0 {
            tracing::info!(percent = step * 10, "{}", message);
        }
        true
    }
}
