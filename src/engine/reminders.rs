use chrono::{DateTime, FixedOffset, NaiveTime, TimeDelta, Utc};
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::engine::automation::OrderAutomation;
use crate::error::AppError;
use crate::models::message::MessageType;
use crate::models::order::{Order, OrderStatus};
use crate::store::OrderQuery;

#[derive(Debug, Clone)]
pub struct ReminderSettings {
    pub interval: Duration,
    pub lead_minutes: i64,
    /// Offset of the delivery area's local time, used for "today" and slot times.
    pub utc_offset: FixedOffset,
}

pub async fn run_reminder_loop(automation: OrderAutomation, settings: ReminderSettings) {
    info!(
        interval_secs = settings.interval.as_secs(),
        lead_minutes = settings.lead_minutes,
        "delivery reminder loop started"
    );

    let mut ticker = time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let sent = send_due_reminders(&automation, &settings, Utc::now()).await;
        if sent > 0 {
            info!(sent, "delivery reminders sent");
        }
    }
}

/// One sweep. Returns how many reminders went out; per-order failures are
/// logged and skipped.
pub async fn send_due_reminders(
    automation: &OrderAutomation,
    settings: &ReminderSettings,
    now: DateTime<Utc>,
) -> usize {
    let due = match due_reminders(automation, settings, now).await {
        Ok(due) => due,
        Err(err) => {
            error!(error = %err, "failed to fetch orders for delivery reminders");
            return 0;
        }
    };

    let mut sent = 0;
    for order in due {
        match automation
            .send_delivery_reminder(order.id, settings.lead_minutes)
            .await
        {
            Ok(()) => sent += 1,
            Err(err) => warn!(order_id = %order.id, error = %err, "failed to send delivery reminder"),
        }
    }
    sent
}

/// Today's assigned `scheduled`/`preparing` orders whose slot starts within
/// the lead window and that have not had a reminder yet.
pub async fn due_reminders(
    automation: &OrderAutomation,
    settings: &ReminderSettings,
    now: DateTime<Utc>,
) -> Result<Vec<Order>, AppError> {
    let local_now = now.with_timezone(&settings.utc_offset).naive_local();
    let today = local_now.date();
    let lead = TimeDelta::minutes(settings.lead_minutes);

    let candidates = automation
        .orders()
        .find_orders(OrderQuery {
            statuses: vec![OrderStatus::Scheduled, OrderStatus::Preparing],
            delivery_date: Some(today),
            ..OrderQuery::default()
        })
        .await?;

    let mut due = Vec::new();
    for order in candidates {
        if order.driver_id.is_none() {
            continue;
        }
        let Some(start) = order.delivery_time_slot.as_deref().and_then(slot_start) else {
            continue;
        };

        let until_start = today.and_time(start) - local_now;
        if until_start < TimeDelta::zero() || until_start > lead {
            continue;
        }

        if automation
            .messages()
            .has_sent(order.id, MessageType::DriverDeliveryReminder)
            .await?
        {
            continue;
        }
        due.push(order);
    }

    Ok(due)
}

/// Start time of a slot label: `"Morning 6-9AM"` is 06:00, `"Evening 6-9PM"`
/// is 18:00, `"18:30-20:00"` is 18:30. A trailing AM/PM applies to the whole
/// range, so `"11-1PM"` starts at 11:00.
pub fn slot_start(slot: &str) -> Option<NaiveTime> {
    let first_digit = slot.find(|c: char| c.is_ascii_digit())?;
    let (hour, minute, rest) = parse_clock(&slot[first_digit..])?;

    let label = slot.trim().to_ascii_uppercase();
    let hour = if label.ends_with("AM") {
        hour % 12
    } else if label.ends_with("PM") {
        let end_hour = rest
            .find(|c: char| c.is_ascii_digit())
            .and_then(|at| parse_clock(&rest[at..]))
            .map(|(end, _, _)| end % 12);

        match end_hour {
            Some(end) if hour % 12 > end => hour % 12,
            _ => hour % 12 + 12,
        }
    } else {
        hour
    };

    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn parse_clock(text: &str) -> Option<(u32, u32, &str)> {
    let hour_len = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let hour = text[..hour_len].parse().ok()?;
    let rest = &text[hour_len..];

    match rest.strip_prefix(':') {
        Some(after) => {
            let minute_len = after
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after.len());
            let minute = after[..minute_len].parse().ok()?;
            Some((hour, minute, &after[minute_len..]))
        }
        None => Some((hour, 0, rest)),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::engine::testing::Harness;
    use crate::store::MessageLog;

    fn settings() -> ReminderSettings {
        ReminderSettings {
            interval: Duration::from_secs(300),
            lead_minutes: 30,
            utc_offset: FixedOffset::east_opt(3 * 3600).unwrap(),
        }
    }

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn slot_labels_resolve_to_start_times() {
        assert_eq!(slot_start("Morning 6-9AM"), Some(at(6, 0)));
        assert_eq!(slot_start("Afternoon 12-3PM"), Some(at(12, 0)));
        assert_eq!(slot_start("Evening 6-9PM"), Some(at(18, 0)));
        assert_eq!(slot_start("11-1PM"), Some(at(11, 0)));
        assert_eq!(slot_start("18:30-20:00"), Some(at(18, 30)));
        assert_eq!(slot_start("6:30-8PM"), Some(at(18, 30)));
        assert_eq!(slot_start("Anytime"), None);
        assert_eq!(slot_start("25-26"), None);
    }

    #[tokio::test]
    async fn reminders_go_to_orders_starting_within_lead_window() {
        let h = Harness::new();
        // 05:40 local on the harness delivery date.
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 2, 40, 0).unwrap();

        let due_soon = h.order_in(OrderStatus::Scheduled, true);
        let mut later = h.order_in(OrderStatus::Preparing, true);
        later.delivery_time_slot = Some("Afternoon 12-3PM".to_string());
        h.store.insert_order(later);
        h.order_in(OrderStatus::Scheduled, false);
        h.order_in(OrderStatus::OutForDelivery, true);

        let sent = send_due_reminders(&h.automation, &settings(), now).await;

        assert_eq!(sent, 1);
        assert!(
            h.store
                .has_sent(due_soon.id, MessageType::DriverDeliveryReminder)
                .await
                .unwrap()
        );
        let to_driver = h.gateway.sent_to(h.driver_phone());
        assert!(to_driver[0].text.contains("delivery in 30 minutes"));
    }

    #[tokio::test]
    async fn each_order_is_reminded_once() {
        let h = Harness::new();
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 2, 45, 0).unwrap();
        h.order_in(OrderStatus::Scheduled, true);

        assert_eq!(send_due_reminders(&h.automation, &settings(), now).await, 1);
        assert_eq!(send_due_reminders(&h.automation, &settings(), now).await, 0);
    }

    #[tokio::test]
    async fn started_slots_and_other_days_are_skipped() {
        let h = Harness::new();
        h.order_in(OrderStatus::Scheduled, true);

        let after_start = Utc.with_ymd_and_hms(2026, 10, 16, 3, 10, 0).unwrap();
        assert_eq!(send_due_reminders(&h.automation, &settings(), after_start).await, 0);

        let day_before = Utc.with_ymd_and_hms(2026, 10, 15, 2, 40, 0).unwrap();
        assert_eq!(send_due_reminders(&h.automation, &settings(), day_before).await, 0);
    }

    #[tokio::test]
    async fn failed_reminder_is_retried_next_sweep() {
        let h = Harness::new();
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 2, 40, 0).unwrap();
        h.order_in(OrderStatus::Scheduled, true);

        h.gateway.fail_with("offline");
        assert_eq!(send_due_reminders(&h.automation, &settings(), now).await, 0);

        h.gateway.recover();
        assert_eq!(send_due_reminders(&h.automation, &settings(), now).await, 1);
    }
}
