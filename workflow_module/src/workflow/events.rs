/// Interpretation of an inbound, largely unstructured warehouse reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarehouseDisposition {
    Accepted,
    Declined,
}

const DECLINE_MARKERS: &[&str] = &[
    "cannot",
    "can't",
    "cant cancel",
    "unable",
    "too late",
    "already shipped",
    "has shipped",
    "already left",
    "denied",
    "refuse",
    "not possible",
];

/// Keyword scan over the reply body; anything that does not read as a
/// refusal counts as an accepted cancellation.
pub fn interpret_warehouse_reply(reply: &str) -> WarehouseDisposition {
    let lowered = reply.to_lowercase();
    if DECLINE_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        WarehouseDisposition::Declined
    } else {
        WarehouseDisposition::Accepted
    }
}
