mod commerce;
mod error;
mod shipbob;
mod shipstation;
mod types;

pub use commerce::CommerceClient;
pub use error::CommerceError;
pub use shipbob::ShipBobClient;
pub use shipstation::ShipStationClient;
pub use types::{Order, OrderCancelResult, RefundParams, RefundReceipt};
