//! WhatsApp message bodies. Pure string rendering over an [`OrderDetails`]
//! snapshot; WhatsApp renders `*bold*` and `_italic_`.

use chrono::NaiveDate;

use crate::models::order::OrderDetails;

const BRAND: &str = "Healthy Club";

fn long_date(date: NaiveDate) -> String {
    date.format("%A, %-d %B %Y").to_string()
}

fn day_and_month(date: NaiveDate) -> String {
    date.format("%A, %-d %B").to_string()
}

pub fn driver_order_notification(details: &OrderDetails) -> String {
    let order = &details.order;
    let time_slot = order.delivery_time_slot.as_deref().unwrap_or("Not specified");
    let customer_phone = details.customer_phone.as_deref().unwrap_or("-");
    let notes = match order.notes.as_deref() {
        Some(notes) if !notes.trim().is_empty() => format!("📝 *Notes:* {notes}\n\n"),
        _ => String::new(),
    };

    format!(
        "🍽️ *New Delivery Assigned!*\n\n\
         📅 *Date:* {date}\n\n\
         👤 *Customer:* {customer}\n\
         📱 *Phone:* {customer_phone}\n\n\
         🏠 *Address:*\n{address}\n\n\
         📦 *Package:* {package}\n\
         🕐 *Time Slot:* {time_slot}\n\n\
         {notes}*Reply with:*\n\
         1️⃣ to ACCEPT\n\
         2️⃣ to REJECT\n\n\
         _Order ID: {id}_",
        date = long_date(order.delivery_date),
        customer = details.customer_name,
        address = order.delivery_address,
        package = order.package_type,
        id = order.id,
    )
}

pub fn driver_delivery_reminder(details: &OrderDetails, lead_minutes: i64) -> String {
    let order = &details.order;
    let customer_phone = details.customer_phone.as_deref().unwrap_or("-");

    format!(
        "⏰ *Delivery Reminder*\n\n\
         You have a delivery in {lead_minutes} minutes!\n\n\
         👤 *Customer:* {customer}\n\
         📱 *Phone:* {customer_phone}\n\n\
         🏠 *Address:*\n{address}\n\n\
         _Order ID: {id}_",
        customer = details.customer_name,
        address = order.delivery_address,
        id = order.id,
    )
}

pub fn customer_order_confirmed(details: &OrderDetails) -> String {
    let order = &details.order;
    let time_slot = order.delivery_time_slot.as_deref().unwrap_or("as scheduled");
    let driver = details
        .driver_name
        .as_deref()
        .map(|name| format!("🚗 *Driver:* {name}\n\n"))
        .unwrap_or_default();

    format!(
        "✅ *Your meal is being prepared!*\n\n\
         📅 *Delivery Date:* {date}\n\n\
         🕐 *Time:* {time_slot}\n\n\
         📦 *Package:* {package}\n\n\
         {driver}We'll notify you when your meal is out for delivery.\n\n\
         _{BRAND} - Healthy Meals, Delivered Fresh_ 🥗",
        date = day_and_month(order.delivery_date),
        package = order.package_type,
    )
}

pub fn customer_out_for_delivery(driver_name: &str, driver_phone: &str) -> String {
    format!(
        "🚗 *Your meal is out for delivery!*\n\n\
         Driver *{driver_name}* is on the way.\n\n\
         📱 *Driver Contact:* {driver_phone}\n\n\
         Expected arrival within your selected time slot.\n\n\
         _{BRAND} - Fresh & Healthy_ 🥗"
    )
}

pub fn customer_delivered() -> String {
    format!(
        "✅ *Delivered Successfully!*\n\n\
         Enjoy your healthy meal! 🥗\n\n\
         Thank you for choosing {BRAND}.\n\n\
         _Have feedback? Reply to this message!_"
    )
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::models::order::Order;

    fn details() -> OrderDetails {
        let mut order = Order::scheduled(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Keto",
            "Seef, Block 428, Road 2825, Building 61",
            NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
            Some("Morning 6-9AM".to_string()),
        );
        order.notes = Some("Leave at reception".to_string());

        OrderDetails {
            order,
            customer_name: "Fatima Ahmed".to_string(),
            customer_phone: Some("+97333000001".to_string()),
            driver_name: Some("Hassan".to_string()),
            driver_phone: Some("+97300000001".to_string()),
        }
    }

    #[test]
    fn driver_notification_lists_delivery_and_reply_options() {
        let details = details();
        let text = driver_order_notification(&details);

        assert!(text.contains("Friday, 16 October 2026"));
        assert!(text.contains("*Customer:* Fatima Ahmed"));
        assert!(text.contains("Seef, Block 428"));
        assert!(text.contains("*Time Slot:* Morning 6-9AM"));
        assert!(text.contains("📝 *Notes:* Leave at reception"));
        assert!(text.contains("1️⃣ to ACCEPT"));
        assert!(text.contains(&details.order.id.to_string()));
    }

    #[test]
    fn blank_notes_are_omitted() {
        let mut details = details();
        details.order.notes = Some("  ".to_string());
        details.order.delivery_time_slot = None;

        let text = driver_order_notification(&details);
        assert!(!text.contains("Notes:"));
        assert!(text.contains("*Time Slot:* Not specified"));
    }

    #[test]
    fn confirmation_mentions_driver_when_known() {
        let mut details = details();
        assert!(customer_order_confirmed(&details).contains("🚗 *Driver:* Hassan"));

        details.driver_name = None;
        assert!(!customer_order_confirmed(&details).contains("Driver:"));
    }

    #[test]
    fn out_for_delivery_carries_driver_contact() {
        let text = customer_out_for_delivery("Hassan", "+97300000001");
        assert!(text.contains("Driver *Hassan* is on the way."));
        assert!(text.contains("+97300000001"));
    }
}
