mod dispatch;
mod haptics;
mod ticker;

pub use self::dispatch::{Dispatch, DispatchOperation, DispatchOutput};
pub use self::haptics::{Haptics, HapticsOperation};
pub use self::ticker::{Ticker, TickerOperation, TickerOutput};

pub use crux_core::render::Render;

use crate::app::App;
use crate::event::Event;
use crate::trigger::{SessionId, SignalRelease};

#[derive(crux_core::macros::Effect)]
#[effect(app = "App")]
pub struct Capabilities {
    pub render: Render<Event>,
    pub haptics: Haptics<Event>,
    pub ticker: Ticker<Event>,
    pub dispatch: Dispatch<Event>,
}

impl SignalRelease for Capabilities {
    fn stop_alerting(&self, session: SessionId) {
        self.haptics.stop_alerting(session);
    }

    fn stop_ticking(&self, session: SessionId) {
        self.ticker.disarm(session);
    }
}
