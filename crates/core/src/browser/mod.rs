//! Bounded pool of exclusive-use browser sessions.

mod pool;
mod session;

pub use pool::{PoolableSession, SessionHandle, SessionPool};
pub use session::BrowserSession;

/// Pool specialised to real chromium sessions.
pub type BrowserPool = SessionPool<BrowserSession>;
