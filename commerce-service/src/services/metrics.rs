use crate::models::NotificationTemplate;

pub fn record_login_blocked(route: &'static str) {
    metrics::counter!("customer_login_blocked_total", "route" => route).increment(1);
}

pub fn record_verification_email_sent() {
    metrics::counter!("verification_emails_sent_total").increment(1);
}

pub fn record_email_verified() {
    metrics::counter!("emails_verified_total").increment(1);
}

pub fn record_notification_created(template: NotificationTemplate) {
    metrics::counter!("notifications_created_total", "template" => template.as_str()).increment(1);
}

pub fn record_event_processed(event: &'static str, outcome: &'static str) {
    metrics::counter!("events_processed_total", "event" => event, "outcome" => outcome).increment(1);
}
