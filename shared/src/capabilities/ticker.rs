use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::trigger::SessionId;

/// One-shot timers owned by the shell. The core arms one tick at a time and
/// re-arms after each, so disarming only ever has one pending timer to drop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", content = "data")]
pub enum TickerOperation {
    Arm { session: SessionId, interval_ms: u64 },
    Disarm { session: SessionId },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TickerOutput {
    Elapsed { session: SessionId },
    Disarmed { session: SessionId },
}

impl TickerOutput {
    #[must_use]
    pub const fn session(&self) -> SessionId {
        match self {
            Self::Elapsed { session } | Self::Disarmed { session } => *session,
        }
    }
}

impl Operation for TickerOperation {
    type Output = TickerOutput;
}

#[derive(Capability)]
pub struct Ticker<Ev> {
    context: CapabilityContext<TickerOperation, Ev>,
}

impl<Ev> Ticker<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<TickerOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn arm<F>(&self, session: SessionId, interval: Duration, callback: F)
    where
        F: FnOnce(TickerOutput) -> Ev + Send + 'static,
    {
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let output = ctx
                .request_from_shell(TickerOperation::Arm {
                    session,
                    interval_ms,
                })
                .await;
            ctx.update_app(callback(output));
        });
    }

    pub fn disarm(&self, session: SessionId) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(TickerOperation::Disarm { session }).await;
        });
    }
}
