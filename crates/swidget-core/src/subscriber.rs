// ── State-change subscriber ──

use std::fmt;
use std::sync::Arc;

use swidget_api::websocket::StateDelta;

/// Callback signature for state-change notifications.
pub type Callback = Arc<dyn Fn(Arc<StateDelta>) + Send + Sync>;

/// Who gets told about inbound notifications.
///
/// Called in receive order, after the delta has been merged into the
/// cached state. Each call runs on tokio's blocking pool, so a slow
/// callback delays later notifications but never the runtime workers.
#[derive(Clone, Default)]
pub enum Subscriber {
    #[default]
    None,
    Callback(Callback),
}

impl Subscriber {
    pub fn callback(f: impl Fn(Arc<StateDelta>) + Send + Sync + 'static) -> Self {
        Self::Callback(Arc::new(f))
    }

    pub(crate) fn notify(&self, delta: Arc<StateDelta>) {
        if let Self::Callback(f) = self {
            f(delta);
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("Subscriber::None"),
            Self::Callback(_) => f.write_str("Subscriber::Callback(..)"),
        }
    }
}
