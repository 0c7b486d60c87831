use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::message::{MessageLogEntry, MessageStatus, MessageType, NewMessage};
use crate::models::order::{Expected, Order, OrderDetails, OrderPatch, OrderStatus};
use crate::models::profile::{Profile, Role};
use crate::phone;
use crate::store::{MessageLog, OrderQuery, OrderStore, StoreError};

/// Profiles and orders to preload, in the same JSON shape the API returns.
#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub orders: Vec<Order>,
}

pub struct InMemoryStore {
    profiles: DashMap<Uuid, Profile>,
    orders: DashMap<Uuid, Order>,
    messages: DashMap<Uuid, MessageLogEntry>,
    provider_ids: DashMap<String, Uuid>,
    country_code: String,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(phone::DEFAULT_COUNTRY_CODE)
    }
}

impl InMemoryStore {
    pub fn new(country_code: impl Into<String>) -> Self {
        Self {
            profiles: DashMap::new(),
            orders: DashMap::new(),
            messages: DashMap::new(),
            provider_ids: DashMap::new(),
            country_code: country_code.into(),
        }
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.profiles.insert(profile.id, profile);
    }

    pub fn insert_order(&self, order: Order) {
        self.orders.insert(order.id, order);
    }

    pub fn seed(&self, data: SeedData) {
        for profile in data.profiles {
            self.insert_profile(profile);
        }
        for order in data.orders {
            self.insert_order(order);
        }
    }

    pub fn load_seed_file(&self, path: &Path) -> Result<(usize, usize), StoreError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            StoreError::Unavailable(format!("failed to read seed {}: {err}", path.display()))
        })?;
        let data: SeedData = serde_json::from_str(&raw).map_err(|err| {
            StoreError::Unavailable(format!("invalid seed {}: {err}", path.display()))
        })?;

        let counts = (data.profiles.len(), data.orders.len());
        self.seed(data);
        Ok(counts)
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    fn profile(&self, id: Uuid) -> Option<Profile> {
        self.profiles.get(&id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn get_order(&self, id: Uuid) -> Result<Order, StoreError> {
        self.orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))
    }

    async fn order_details(&self, id: Uuid) -> Result<OrderDetails, StoreError> {
        let order = self.get_order(id).await?;

        let customer = self
            .profile(order.customer_id)
            .ok_or_else(|| StoreError::NotFound(format!("customer for order {id}")))?;
        let driver = order.driver_id.and_then(|driver_id| self.profile(driver_id));

        Ok(OrderDetails {
            customer_name: customer.full_name,
            customer_phone: customer.phone,
            driver_name: driver.as_ref().map(|d| d.full_name.clone()),
            driver_phone: driver.and_then(|d| d.phone),
            order,
        })
    }

    async fn find_orders_by_driver_and_status(
        &self,
        driver_id: Uuid,
        status: OrderStatus,
        limit: usize,
    ) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.driver_id == Some(driver_id) && entry.status == status)
            .map(|entry| entry.value().clone())
            .collect();

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders.truncate(limit);
        Ok(orders)
    }

    async fn find_orders(&self, query: OrderQuery) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                query.customer_id.is_none_or(|id| order.customer_id == id)
                    && query.driver_id.is_none_or(|id| order.driver_id == Some(id))
                    && (query.statuses.is_empty() || query.statuses.contains(&order.status))
                    && query
                        .delivery_date
                        .is_none_or(|date| order.delivery_date == date)
            })
            .map(|entry| entry.value().clone())
            .collect();

        orders.sort_by(|a, b| {
            b.delivery_date
                .cmp(&a.delivery_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        Ok(orders
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn get_profile(&self, id: Uuid) -> Result<Profile, StoreError> {
        self.profile(id)
            .ok_or_else(|| StoreError::NotFound(format!("profile {id}")))
    }

    async fn find_profile_by_phone_and_role(
        &self,
        phone_number: &str,
        role: Role,
    ) -> Result<Option<Profile>, StoreError> {
        Ok(self
            .profiles
            .iter()
            .find(|entry| {
                entry.role == role
                    && entry.phone.as_deref().is_some_and(|stored| {
                        phone::same_number(stored, phone_number, &self.country_code)
                    })
            })
            .map(|entry| entry.value().clone()))
    }

    async fn update_order(
        &self,
        id: Uuid,
        patch: OrderPatch,
        expected: Expected,
    ) -> Result<Order, StoreError> {
        // The shard write guard is held across check and apply.
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))?;

        if !expected.matches(entry.value()) {
            return Err(StoreError::Conflict(Box::new(entry.value().clone())));
        }

        patch.apply(entry.value_mut(), Utc::now());
        Ok(entry.value().clone())
    }
}

#[async_trait]
impl MessageLog for InMemoryStore {
    async fn append(&self, message: NewMessage) -> Result<MessageLogEntry, StoreError> {
        let entry = message.into_entry();
        if let Some(provider_id) = &entry.provider_message_id {
            self.provider_ids.insert(provider_id.clone(), entry.id);
        }
        self.messages.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn append_unique(
        &self,
        message: NewMessage,
    ) -> Result<Option<MessageLogEntry>, StoreError> {
        let Some(provider_id) = message.provider_message_id.clone() else {
            return self.append(message).await.map(Some);
        };

        match self.provider_ids.entry(provider_id) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(slot) => {
                let entry = message.into_entry();
                slot.insert(entry.id);
                self.messages.insert(entry.id, entry.clone());
                Ok(Some(entry))
            }
        }
    }

    async fn latest_for_order(
        &self,
        order_id: Uuid,
        message_type: MessageType,
    ) -> Result<Option<MessageLogEntry>, StoreError> {
        Ok(self
            .messages
            .iter()
            .filter(|entry| entry.order_id == Some(order_id) && entry.message_type == message_type)
            .max_by_key(|entry| entry.sent_at)
            .map(|entry| entry.value().clone()))
    }

    async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<MessageLogEntry>, StoreError> {
        let mut entries: Vec<MessageLogEntry> = self
            .messages
            .iter()
            .filter(|entry| entry.order_id == Some(order_id))
            .map(|entry| entry.value().clone())
            .collect();

        entries.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(entries)
    }

    async fn has_sent(
        &self,
        order_id: Uuid,
        message_type: MessageType,
    ) -> Result<bool, StoreError> {
        Ok(self.messages.iter().any(|entry| {
            entry.order_id == Some(order_id)
                && entry.message_type == message_type
                && entry.status == MessageStatus::Sent
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;

    fn order_for(customer: &Profile) -> Order {
        Order::scheduled(
            Uuid::new_v4(),
            customer.id,
            "Normal",
            "Juffair, Block 340, Road 4012",
            NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
            Some("Morning 6-9AM".to_string()),
        )
    }

    #[tokio::test]
    async fn conditional_update_rejects_stale_expectation() {
        let store = InMemoryStore::default();
        let customer = Profile::new("Mariam", Some("+97333000001"), Role::Customer);
        let order = order_for(&customer);
        let id = order.id;
        store.insert_profile(customer);
        store.insert_order(order);

        let patch = OrderPatch {
            status: Some(OrderStatus::Preparing),
            ..OrderPatch::default()
        };
        let updated = store
            .update_order(id, patch.clone(), Expected::status(OrderStatus::Scheduled))
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Preparing);

        let err = store
            .update_order(id, patch, Expected::status(OrderStatus::Scheduled))
            .await
            .unwrap_err();
        match err {
            StoreError::Conflict(current) => assert_eq!(current.status, OrderStatus::Preparing),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_claims_admit_exactly_one_winner() {
        let store = Arc::new(InMemoryStore::default());
        let customer = Profile::new("Ali", None, Role::Customer);
        let mut order = order_for(&customer);
        order.driver_id = Some(Uuid::from_u128(1));
        let id = order.id;
        store.insert_order(order);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let patch = OrderPatch {
                    driver_notified_at: Some(Some(Utc::now())),
                    ..OrderPatch::default()
                };
                let expected = Expected {
                    driver_notified_at: Some(None),
                    ..Expected::default()
                };
                store.update_order(id, patch, expected).await.is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn profile_lookup_matches_normalised_phone_and_role() {
        let store = InMemoryStore::default();
        let driver = Profile::new("Hassan", Some("+973 0000 0001"), Role::Driver);
        store.insert_profile(driver.clone());

        let found = store
            .find_profile_by_phone_and_role("97300000001", Role::Driver)
            .await
            .unwrap();
        assert_eq!(found.map(|p| p.id), Some(driver.id));

        let wrong_role = store
            .find_profile_by_phone_and_role("97300000001", Role::Customer)
            .await
            .unwrap();
        assert!(wrong_role.is_none());
    }

    #[tokio::test]
    async fn driver_orders_come_back_newest_first() {
        let store = InMemoryStore::default();
        let customer = Profile::new("Noor", None, Role::Customer);
        let driver_id = Uuid::from_u128(9);

        let mut older = order_for(&customer);
        older.driver_id = Some(driver_id);
        older.created_at = Utc::now() - chrono::Duration::hours(2);
        let mut newer = order_for(&customer);
        newer.driver_id = Some(driver_id);
        let newer_id = newer.id;
        store.insert_order(older);
        store.insert_order(newer);

        let found = store
            .find_orders_by_driver_and_status(driver_id, OrderStatus::Scheduled, 1)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, newer_id);
    }

    #[tokio::test]
    async fn append_unique_drops_repeated_provider_ids() {
        let store = InMemoryStore::default();
        let first = NewMessage::incoming("97300000001", "1", Some("wamid-1".into()), Utc::now());

        assert!(store.append_unique(first.clone()).await.unwrap().is_some());
        assert!(store.append_unique(first).await.unwrap().is_none());
        assert_eq!(store.message_count(), 1);
    }

    #[tokio::test]
    async fn has_sent_ignores_failed_attempts() {
        let store = InMemoryStore::default();
        let order_id = Uuid::new_v4();
        store
            .append(NewMessage::failed(
                Some(order_id),
                "97333000001",
                MessageType::CustomerDelivered,
                "gateway down",
            ))
            .await
            .unwrap();

        assert!(
            !store
                .has_sent(order_id, MessageType::CustomerDelivered)
                .await
                .unwrap()
        );
    }

    #[test]
    fn seed_data_accepts_partial_documents() {
        let data: SeedData = serde_json::from_str(r#"{"profiles": []}"#).unwrap();
        assert!(data.orders.is_empty());
    }
}
