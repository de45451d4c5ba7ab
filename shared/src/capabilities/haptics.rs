use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use serde::{Deserialize, Serialize};

use crate::signal::AlertSignal;
use crate::trigger::SessionId;

/// Vibration requests for the shell. `session` is set for the looping
/// countdown signal so the shell can tell it apart from one-off feedback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", content = "data")]
pub enum HapticsOperation {
    Vibrate {
        signal: AlertSignal,
        session: Option<SessionId>,
    },
    Cancel {
        session: Option<SessionId>,
    },
}

impl Operation for HapticsOperation {
    type Output = ();
}

#[derive(Capability)]
pub struct Haptics<Ev> {
    context: CapabilityContext<HapticsOperation, Ev>,
}

impl<Ev> Haptics<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<HapticsOperation, Ev>) -> Self {
        Self { context }
    }

    /// Starts the repeating countdown signal for `session`.
    pub fn start_alerting(&self, session: SessionId, signal: AlertSignal) {
        self.notify(HapticsOperation::Vibrate {
            signal,
            session: Some(session),
        });
    }

    pub fn stop_alerting(&self, session: SessionId) {
        self.notify(HapticsOperation::Cancel {
            session: Some(session),
        });
    }

    /// Fire-and-forget feedback (button press, ring test).
    pub fn feedback(&self, signal: AlertSignal) {
        self.notify(HapticsOperation::Vibrate {
            signal,
            session: None,
        });
    }

    fn notify(&self, operation: HapticsOperation) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(operation).await;
        });
    }
}
