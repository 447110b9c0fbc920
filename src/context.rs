use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Process-wide stop flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Run-wide state handed by reference to the controller, the flight and
/// the solver.
#[derive(Debug, Clone)]
pub struct SearchContext {
    token: CancellationToken,
    started: Instant,
}

impl SearchContext {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            started: Instant::now(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for SearchContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}
