pub(super) const WORKFLOW_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS workflows (
    id TEXT PRIMARY KEY,
    order_number TEXT NOT NULL,
    order_total_cents INTEGER NOT NULL,
    customer_email TEXT NOT NULL,
    fulfillment_method TEXT NOT NULL,
    status TEXT NOT NULL,
    step TEXT NOT NULL,
    eligible INTEGER,
    eligibility_reason TEXT,
    eligibility_deadline TEXT,
    warehouse_reply_received INTEGER NOT NULL DEFAULT 0,
    warehouse_reply TEXT,
    was_canceled INTEGER,
    refund_processed INTEGER NOT NULL DEFAULT 0,
    refund_amount_cents INTEGER,
    customer_acknowledgment_sent INTEGER NOT NULL DEFAULT 0,
    needs_reconciliation INTEGER NOT NULL DEFAULT 0,
    failure_reason TEXT,
    order_created_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS workflow_configs (
    workflow_id TEXT PRIMARY KEY REFERENCES workflows(id) ON DELETE CASCADE,
    method TEXT NOT NULL,
    warehouse_email TEXT,
    shipbob_token TEXT,
    shipstation_api_key TEXT,
    shipstation_api_secret TEXT,
    require_approval INTEGER NOT NULL DEFAULT 0,
    store_utc_offset_minutes INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS approvals (
    id TEXT PRIMARY KEY,
    workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
    action TEXT NOT NULL,
    proposed_action TEXT NOT NULL,
    metadata TEXT NOT NULL,
    status TEXT NOT NULL,
    reason TEXT,
    created_at TEXT NOT NULL,
    resolved_at TEXT
);

CREATE TABLE IF NOT EXISTS side_effects (
    workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
    effect TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (workflow_id, effect)
);

CREATE TABLE IF NOT EXISTS escalations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    detail TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
    event TEXT NOT NULL,
    detail TEXT,
    created_at TEXT NOT NULL
);
"#;
