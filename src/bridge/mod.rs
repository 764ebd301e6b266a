mod calendar_client;

pub use calendar_client::{BridgeError, CalendarBridgeClient, CalendarInfo, EventInfo};
