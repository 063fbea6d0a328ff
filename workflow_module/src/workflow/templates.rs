use chrono::{DateTime, Utc};

use super::effects::EmailMessage;
use super::types::CancellationWorkflow;

/// Customer acknowledgment sent as soon as an eligible request is picked up.
pub(crate) fn acknowledgment_email(workflow: &CancellationWorkflow) -> EmailMessage {
    EmailMessage {
        to: workflow.customer_email.clone(),
        subject: format!("We're on it: cancellation for order {}", workflow.order_number),
        html_body: format!(
            "<p>Hi,</p>\
             <p>We received your request to cancel order <strong>{}</strong> and are \
             working on it now. We'll confirm as soon as we hear back.</p>",
            workflow.order_number
        ),
    }
}

/// Customer message when the request arrived after the eligibility window.
/// Distinct from the warehouse-declined message.
pub(crate) fn too_late_email(workflow: &CancellationWorkflow) -> EmailMessage {
    let deadline = workflow
        .eligibility_deadline
        .map(format_deadline)
        .unwrap_or_else(|| "the cancellation window".to_string());
    EmailMessage {
        to: workflow.customer_email.clone(),
        subject: format!("Order {} can no longer be canceled", workflow.order_number),
        html_body: format!(
            "<p>Hi,</p>\
             <p>Unfortunately order <strong>{}</strong> could not be canceled because the \
             request arrived after {}. The order is already on its way.</p>\
             <p>Once it arrives, you can start a return and we'll take care of the rest.</p>",
            workflow.order_number, deadline
        ),
    }
}

/// Cancellation request sent to the merchant's warehouse team.
pub(crate) fn warehouse_request_email(
    workflow: &CancellationWorkflow,
    warehouse_to: &str,
) -> EmailMessage {
    EmailMessage {
        to: warehouse_to.to_string(),
        subject: format!("Cancellation request: order {}", workflow.order_number),
        html_body: format!(
            "<p>Please cancel order <strong>{}</strong> if it has not shipped yet.</p>\
             <p>Customer: {}<br>Order total: {}</p>\
             <p>Reply to this email with whether the cancellation was possible.</p>",
            workflow.order_number,
            workflow.customer_email,
            format_cents(workflow.order_total_cents)
        ),
    }
}

/// Customer confirmation once the cancellation went through.
pub(crate) fn confirmation_email(workflow: &CancellationWorkflow) -> EmailMessage {
    let refund_line = match workflow.refund_amount_cents {
        Some(amount) if workflow.refund_processed => format!(
            "<p>A refund of <strong>{}</strong> is on its way back to your original \
             payment method.</p>",
            format_cents(amount)
        ),
        _ => "<p>Your refund is being processed and will follow shortly.</p>".to_string(),
    };
    EmailMessage {
        to: workflow.customer_email.clone(),
        subject: format!("Order {} has been canceled", workflow.order_number),
        html_body: format!(
            "<p>Hi,</p>\
             <p>Good news: order <strong>{}</strong> has been canceled.</p>{}",
            workflow.order_number, refund_line
        ),
    }
}

/// Customer message when the warehouse or shipping backend declined the
/// cancellation. Distinct from the too-late message.
pub(crate) fn declined_email(workflow: &CancellationWorkflow) -> EmailMessage {
    EmailMessage {
        to: workflow.customer_email.clone(),
        subject: format!("Order {} could not be canceled", workflow.order_number),
        html_body: format!(
            "<p>Hi,</p>\
             <p>We tried to cancel order <strong>{}</strong>, but it had already been \
             handed to the carrier.</p>\
             <p>Once it arrives, you can start a return and we'll take care of the rest.</p>",
            workflow.order_number
        ),
    }
}

fn format_cents(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, (cents % 100).abs())
}

fn format_deadline(deadline: DateTime<Utc>) -> String {
    deadline.format("%A %H:%M UTC").to_string()
}
