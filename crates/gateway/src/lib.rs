//! Adapters for the two external systems the clinic talks to: the calendar
//! that reports busy time, and the chat gateway that delivers replies.

pub mod calendar;
pub mod error;
pub mod messaging;

pub use calendar::{BusyTimeSource, HttpCalendarClient, NoopBusyTimeSource, StaticBusyTimeSource};
pub use error::TransportError;
pub use messaging::{
    DeliveryReceipt, HttpMessageGateway, MessageGateway, NoopMessageGateway,
    RecordingMessageGateway, SentMessage,
};
