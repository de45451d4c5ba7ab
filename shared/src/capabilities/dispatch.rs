use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dispatch::{AlertDispatcher, AlertId, AlertStatus, DeliveryHandle, DispatchRequest};
use crate::event::Event;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchOperation {
    pub alert_id: AlertId,
    pub request: DispatchRequest,
}

/// Delivery status reported back by the shell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchOutput {
    pub alert_id: AlertId,
    pub status: AlertStatus,
    #[serde(default)]
    pub detail: Option<String>,
}

impl Operation for DispatchOperation {
    type Output = DispatchOutput;
}

/// Hands confirmed alerts to the shell, which owns contacts, SMS and the
/// emergency-service integrations.
#[derive(Capability)]
pub struct Dispatch<Ev> {
    context: CapabilityContext<DispatchOperation, Ev>,
}

impl<Ev> Dispatch<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<DispatchOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn send<F>(&self, alert_id: AlertId, request: DispatchRequest, callback: F)
    where
        F: FnOnce(DispatchOutput) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let output = ctx
                .request_from_shell(DispatchOperation { alert_id, request })
                .await;
            ctx.update_app(callback(output));
        });
    }
}

impl AlertDispatcher for Dispatch<Event> {
    fn dispatch(&self, request: DispatchRequest) -> DeliveryHandle {
        let alert_id = AlertId::generate();
        info!(alert_id = %alert_id, kind = %request.trigger_kind, "dispatching emergency alert");
        self.send(alert_id.clone(), request, |output| Event::DispatchUpdated {
            alert_id: output.alert_id,
            status: output.status,
            detail: output.detail,
        });
        DeliveryHandle {
            alert_id,
            status: AlertStatus::Pending,
        }
    }
}
