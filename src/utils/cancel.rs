//! Cooperative cancellation shared between the orchestrator, the worker pool and Ctrl+C.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Cloneable stop flag. Raising it stops new submissions; work already started runs to completion.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Clear the flag so the token can drive another run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Held across `ctrlc::set_handler` so concurrent first calls install exactly one handler.
static CTRLC_TOKEN: Mutex<Option<CancelToken>> = Mutex::new(None);

/// Token raised by Ctrl+C. The handler is installed on first call; later calls return the same token.
pub fn install_ctrlc_handler() -> Result<CancelToken> {
    let mut slot = CTRLC_TOKEN.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(token) = slot.as_ref() {
        return Ok(token.clone());
    }
    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        log::warn!("Interrupt received; finishing in-flight items");
        handler_token.cancel();
    })
    .context("set Ctrl+C handler")?;
    *slot = Some(token.clone());
    Ok(token)
}
