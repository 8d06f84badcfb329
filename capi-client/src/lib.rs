pub mod clickid;
pub mod client;
pub mod error;
pub mod event;
pub mod identity;
pub mod retry;

pub use client::{CapiClient, CapiConfig, DeliveryReceipt, EventSink};
pub use error::DeliveryError;
pub use event::{CapiEvent, CustomData, EventBatch, UserData};
