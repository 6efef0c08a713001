//! Orders Test Utilities
//!
//! Shared test infrastructure for the orders workspace:
//! - Proptest generators for orders and their nested records
//! - Fixtures for common scenarios (sample orders, broker payloads)
//! - Assertions for cache and store state

// Re-export the mock store from its source crate
pub use orders_storage::MockOrderStore;

pub use orders_core::{Delivery, Item, Order, OrderError, Payment, Timestamp};
pub use orders_storage::{CacheAdmission, OrderCache};

use chrono::{TimeZone, Utc};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating order data.

    use super::*;
    use proptest::prelude::*;

    /// Generate a non-empty order uid.
    pub fn arb_order_uid() -> impl Strategy<Value = String> {
        "[a-z0-9]{8,20}"
    }

    /// Generate a Timestamp within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    prop_compose! {
        pub fn arb_delivery()(
            name in "[A-Z][a-z]{2,10} [A-Z][a-z]{2,10}",
            phone in "\\+[0-9]{10}",
            zip in "[0-9]{6,7}",
            city in "[A-Z][a-z]{3,12}",
            address in "[A-Z][a-z]{3,10} [0-9]{1,3}",
            region in "[A-Z][a-z]{3,10}",
            email in "[a-z]{3,8}@[a-z]{3,6}\\.com",
        ) -> Delivery {
            Delivery { name, phone, zip, city, address, region, email }
        }
    }

    prop_compose! {
        pub fn arb_payment()(
            transaction in "[a-z0-9]{12,20}",
            currency in prop_oneof![Just("USD"), Just("EUR"), Just("RUB")],
            provider in "[a-z]{4,8}",
            amount in 0i64..1_000_000,
            payment_dt in 1577836800i64..1893456000i64,
            bank in "[a-z]{3,10}",
            delivery_cost in 0i64..10_000,
            goods_total in 0i64..1_000_000,
            custom_fee in 0i64..1_000,
        ) -> Payment {
            Payment {
                transaction,
                request_id: String::new(),
                currency: currency.to_string(),
                provider,
                amount,
                payment_dt,
                bank,
                delivery_cost,
                goods_total,
                custom_fee,
            }
        }
    }

    prop_compose! {
        pub fn arb_item()(
            chrt_id in 1i64..10_000_000,
            track_number in "[A-Z]{8,14}",
            price in 0i64..100_000,
            rid in "[a-z0-9]{16,21}",
            name in "[A-Z][a-z]{3,12}",
            sale in 0i64..90,
            size in "[0-9]{1,2}",
            nm_id in 1i64..10_000_000,
            brand in "[A-Z][a-z]{3,12}",
            status in 100i64..500,
        ) -> Item {
            let total_price = price * (100 - sale) / 100;
            Item { chrt_id, track_number, price, rid, name, sale, size, total_price, nm_id, brand, status }
        }
    }

    prop_compose! {
        pub fn arb_order()(
            order_uid in arb_order_uid(),
            track_number in "[A-Z]{8,14}",
            delivery in arb_delivery(),
            payment in arb_payment(),
            items in prop::collection::vec(arb_item(), 0..5),
            locale in prop_oneof![Just("en"), Just("ru")],
            customer_id in "[a-z]{3,10}",
            delivery_service in "[a-z]{4,8}",
            shardkey in "[0-9]{1,2}",
            sm_id in 0i64..1000,
            date_created in arb_timestamp(),
            oof_shard in "[0-9]",
        ) -> Order {
            Order {
                order_uid,
                track_number,
                entry: "WBIL".to_string(),
                delivery,
                payment,
                items,
                locale: locale.to_string(),
                internal_signature: String::new(),
                customer_id,
                delivery_service,
                shardkey,
                sm_id,
                date_created,
                oof_shard,
            }
        }
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built orders and payloads for common testing scenarios.

    use super::*;

    /// A fully populated order with the given uid.
    pub fn sample_order(order_uid: &str) -> Order {
        Order {
            order_uid: order_uid.to_string(),
            track_number: "WBILMTESTTRACK".to_string(),
            entry: "WBIL".to_string(),
            delivery: Delivery {
                name: "Test Testov".to_string(),
                phone: "+9720000000".to_string(),
                zip: "2639809".to_string(),
                city: "Kiryat Mozkin".to_string(),
                address: "Ploshad Mira 15".to_string(),
                region: "Kraiot".to_string(),
                email: "test@gmail.com".to_string(),
            },
            payment: Payment {
                transaction: order_uid.to_string(),
                request_id: String::new(),
                currency: "USD".to_string(),
                provider: "wbpay".to_string(),
                amount: 1817,
                payment_dt: 1637907727,
                bank: "alpha".to_string(),
                delivery_cost: 1500,
                goods_total: 317,
                custom_fee: 0,
            },
            items: vec![Item {
                chrt_id: 9934930,
                track_number: "WBILMTESTTRACK".to_string(),
                price: 453,
                rid: "ab4219087a764ae0btest".to_string(),
                name: "Mascaras".to_string(),
                sale: 30,
                size: "0".to_string(),
                total_price: 317,
                nm_id: 2389212,
                brand: "Vivienne Sabo".to_string(),
                status: 202,
            }],
            locale: "en".to_string(),
            internal_signature: String::new(),
            customer_id: "test".to_string(),
            delivery_service: "meest".to_string(),
            shardkey: "9".to_string(),
            sm_id: 99,
            date_created: Utc
                .with_ymd_and_hms(2021, 11, 26, 6, 22, 19)
                .single()
                .unwrap_or_else(Utc::now),
            oof_shard: "1".to_string(),
        }
    }

    /// Sample order created `minutes` after a fixed base instant.
    pub fn order_created_at(order_uid: &str, minutes: i64) -> Order {
        let mut order = sample_order(order_uid);
        order.date_created = order.date_created + chrono::Duration::minutes(minutes);
        order
    }

    /// JSON broker payload for an order.
    pub fn payload(order: &Order) -> Vec<u8> {
        serde_json::to_vec(order).unwrap_or_default()
    }

    /// Well-formed JSON that lacks `order_uid` entirely.
    pub fn payload_without_uid() -> Vec<u8> {
        br#"{"track_number": "WBILMTESTTRACK", "entry": "WBIL", "items": []}"#.to_vec()
    }

    /// Bytes that are not JSON at all.
    pub fn malformed_payload() -> Vec<u8> {
        b"{\"order_uid\": \"broken".to_vec()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for cache and store state.

    use super::*;

    /// Assert the cache never exceeds its configured ceiling.
    #[track_caller]
    pub fn assert_within_limit(cache: &OrderCache) {
        assert!(
            cache.len() <= cache.limit(),
            "cache holds {} entries, limit is {}",
            cache.len(),
            cache.limit()
        );
    }

    /// Assert the cache holds exactly `expected` under its uid.
    #[track_caller]
    pub fn assert_cached(cache: &OrderCache, expected: &Order) {
        match cache.get(&expected.order_uid) {
            Some(found) => assert_eq!(&found, expected, "cached order differs"),
            None => panic!("order {} is not cached", expected.order_uid),
        }
    }

    /// Assert the store holds exactly `expected` under its uid.
    #[track_caller]
    pub fn assert_stored(store: &MockOrderStore, expected: &Order) {
        match store.stored(&expected.order_uid) {
            Some(found) => assert_eq!(&found, expected, "stored order differs"),
            None => panic!("order {} is not stored", expected.order_uid),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sample_order_is_valid() {
        let order = fixtures::sample_order("abc");
        assert!(order.validate().is_ok());
        assert_eq!(order.payment.transaction, "abc");
    }

    #[test]
    fn test_payload_round_trips_through_decoder() -> Result<(), OrderError> {
        let order = fixtures::sample_order("abc");
        let decoded = Order::from_payload(&fixtures::payload(&order))?;
        assert_eq!(decoded, order);
        Ok(())
    }

    #[test]
    fn test_bad_payload_fixtures() {
        assert!(matches!(
            Order::from_payload(&fixtures::payload_without_uid()),
            Err(OrderError::Validation(_))
        ));
        assert!(matches!(
            Order::from_payload(&fixtures::malformed_payload()),
            Err(OrderError::Decode { .. })
        ));
    }

    #[test]
    fn test_order_created_at_offsets() {
        let early = fixtures::order_created_at("a", 0);
        let late = fixtures::order_created_at("b", 5);
        assert!(late.date_created > early.date_created);
    }

    proptest! {
        #[test]
        fn prop_generated_orders_are_valid(order in generators::arb_order()) {
            prop_assert!(order.validate().is_ok());
        }

        #[test]
        fn prop_item_total_never_exceeds_price(item in generators::arb_item()) {
            prop_assert!(item.total_price <= item.price);
        }
    }
}
