//! Ctrl-C handling.
//!
//! The first SIGINT or SIGTERM only sets a flag: the scanner stops walking and
//! the executor stops before starting the next deletion, so a file is never
//! left half-processed. A second signal terminates the process immediately.

use log::debug;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared "stop requested" flag.
///
/// Cloning is cheap and every clone observes the same flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    /// A flag that is only set through [`Interrupt::trigger`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a flag wired to SIGINT and SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if a signal handler cannot be registered.
    pub fn install() -> io::Result<Self> {
        let interrupt = Self::new();
        for signal in [SIGINT, SIGTERM] {
            // Registered first so it only fires when the flag is already set.
            flag::register_conditional_shutdown(signal, 1, Arc::clone(&interrupt.flag))?;
            flag::register(signal, Arc::clone(&interrupt.flag))?;
        }
        debug!("signal handlers installed");
        Ok(interrupt)
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}
