pub mod bus;
pub mod client;
pub mod history;
pub mod hub;
pub mod protocol;

pub use bus::{MessageBus, Subscription};
pub use client::{ChatClient, ConnectionState};
pub use history::{merge_messages, HistorySync};
pub use hub::{HubConnector, HubLink, Invocation, SignalRConnector};
