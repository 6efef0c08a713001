//! Order aggregate and its nested records
//!
//! The JSON field names below are the wire format for both the broker payload
//! and the HTTP response body. Absent and `null` fields decode to their zero
//! value.

use crate::{OrderError, OrderResult, Timestamp, ValidationError};
use serde::{Deserialize, Deserializer, Serialize};

/// Key identifying an order everywhere: cache, store and HTTP path.
pub type OrderUid = String;

/// The unit of ingestion and retrieval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct Order {
    #[serde(deserialize_with = "null_as_default")]
    pub order_uid: OrderUid,
    #[serde(deserialize_with = "null_as_default")]
    pub track_number: String,
    #[serde(deserialize_with = "null_as_default")]
    pub entry: String,
    #[serde(deserialize_with = "null_as_default")]
    pub delivery: Delivery,
    #[serde(deserialize_with = "null_as_default")]
    pub payment: Payment,
    #[serde(deserialize_with = "null_as_default")]
    pub items: Vec<Item>,
    #[serde(deserialize_with = "null_as_default")]
    pub locale: String,
    #[serde(deserialize_with = "null_as_default")]
    pub internal_signature: String,
    #[serde(deserialize_with = "null_as_default")]
    pub customer_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub delivery_service: String,
    #[serde(deserialize_with = "null_as_default")]
    pub shardkey: String,
    #[serde(deserialize_with = "null_as_default")]
    pub sm_id: i64,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    #[serde(deserialize_with = "null_as_default")]
    pub date_created: Timestamp,
    #[serde(deserialize_with = "null_as_default")]
    pub oof_shard: String,
}

/// Recipient contact and address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct Delivery {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub phone: String,
    #[serde(deserialize_with = "null_as_default")]
    pub zip: String,
    #[serde(deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(deserialize_with = "null_as_default")]
    pub region: String,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
}

/// Payment transaction attached to an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct Payment {
    #[serde(deserialize_with = "null_as_default")]
    pub transaction: String,
    #[serde(deserialize_with = "null_as_default")]
    pub request_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(deserialize_with = "null_as_default")]
    pub provider: String,
    #[serde(deserialize_with = "null_as_default")]
    pub amount: i64,
    /// Unix seconds.
    #[serde(deserialize_with = "null_as_default")]
    pub payment_dt: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub bank: String,
    #[serde(deserialize_with = "null_as_default")]
    pub delivery_cost: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub goods_total: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub custom_fee: i64,
}

/// A single line item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct Item {
    #[serde(deserialize_with = "null_as_default")]
    pub chrt_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub track_number: String,
    #[serde(deserialize_with = "null_as_default")]
    pub price: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub rid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub sale: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub size: String,
    #[serde(deserialize_with = "null_as_default")]
    pub total_price: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub nm_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub brand: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: i64,
}

/// Treats an explicit `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Order {
    /// Parse a JSON payload. Does not validate.
    pub fn decode(payload: &[u8]) -> OrderResult<Self> {
        serde_json::from_slice(payload).map_err(OrderError::from)
    }

    /// Check the invariants an order must satisfy before it is persisted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.order_uid.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "order_uid".to_string(),
            });
        }
        Ok(())
    }

    /// Decode and validate in one step.
    pub fn from_payload(payload: &[u8]) -> OrderResult<Self> {
        let order = Self::decode(payload)?;
        order.validate()?;
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const SAMPLE: &str = r#"{
        "order_uid": "b563feb7b2b84b6test",
        "track_number": "WBILMTESTTRACK",
        "entry": "WBIL",
        "delivery": {
            "name": "Test Testov",
            "phone": "+9720000000",
            "zip": "2639809",
            "city": "Kiryat Mozkin",
            "address": "Ploshad Mira 15",
            "region": "Kraiot",
            "email": "test@gmail.com"
        },
        "payment": {
            "transaction": "b563feb7b2b84b6test",
            "request_id": "",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500,
            "goods_total": 317,
            "custom_fee": 0
        },
        "items": [{
            "chrt_id": 9934930,
            "track_number": "WBILMTESTTRACK",
            "price": 453,
            "rid": "ab4219087a764ae0btest",
            "name": "Mascaras",
            "sale": 30,
            "size": "0",
            "total_price": 317,
            "nm_id": 2389212,
            "brand": "Vivienne Sabo",
            "status": 202
        }],
        "locale": "en",
        "internal_signature": "",
        "customer_id": "test",
        "delivery_service": "meest",
        "shardkey": "9",
        "sm_id": 99,
        "date_created": "2021-11-26T06:22:19Z",
        "oof_shard": "1"
    }"#;

    #[test]
    fn test_decode_full_payload() -> OrderResult<()> {
        let order = Order::from_payload(SAMPLE.as_bytes())?;
        assert_eq!(order.order_uid, "b563feb7b2b84b6test");
        assert_eq!(order.delivery.city, "Kiryat Mozkin");
        assert_eq!(order.payment.amount, 1817);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].brand, "Vivienne Sabo");
        assert_eq!(
            order.date_created,
            Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).single().unwrap_or_default()
        );
        Ok(())
    }

    #[test]
    fn test_missing_uid_decodes_but_fails_validation() {
        let order = Order::decode(br#"{"track_number": "T1"}"#);
        assert!(order.is_ok());

        let result = Order::from_payload(br#"{"track_number": "T1"}"#);
        assert_eq!(
            result,
            Err(OrderError::Validation(ValidationError::RequiredFieldMissing {
                field: "order_uid".to_string()
            }))
        );
    }

    #[test]
    fn test_blank_uid_is_rejected() {
        let order = Order {
            order_uid: "   ".to_string(),
            ..Default::default()
        };
        assert!(order.validate().is_err());
    }

    #[test]
    fn test_null_fields_decode_to_zero_values() -> OrderResult<()> {
        let order = Order::from_payload(
            br#"{
                "order_uid": "nil-items",
                "items": null,
                "delivery": {"email": null, "city": "Kraiot"},
                "payment": null,
                "sm_id": null,
                "date_created": null
            }"#,
        )?;
        assert_eq!(order.order_uid, "nil-items");
        assert!(order.items.is_empty());
        assert_eq!(order.delivery.email, "");
        assert_eq!(order.delivery.city, "Kraiot");
        assert_eq!(order.payment, Payment::default());
        assert_eq!(order.sm_id, 0);
        assert_eq!(order.date_created, Timestamp::default());
        Ok(())
    }

    #[test]
    fn test_null_uid_fails_validation() {
        assert!(matches!(
            Order::from_payload(br#"{"order_uid": null}"#),
            Err(OrderError::Validation(_))
        ));
    }

    #[test]
    fn test_malformed_payload_is_decode_error() {
        assert!(matches!(
            Order::decode(b"not json at all"),
            Err(OrderError::Decode { .. })
        ));
        assert!(matches!(
            Order::decode(b"[1, 2, 3]"),
            Err(OrderError::Decode { .. })
        ));
        assert!(matches!(
            Order::decode(br#"{"order_uid": 42}"#),
            Err(OrderError::Decode { .. })
        ));
    }

    #[test]
    fn test_items_keep_wire_order() -> OrderResult<()> {
        let order = Order::from_payload(
            br#"{"order_uid": "o1", "items": [{"chrt_id": 3}, {"chrt_id": 1}, {"chrt_id": 2}]}"#,
        )?;
        let ids: Vec<i64> = order.items.iter().map(|i| i.chrt_id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        Ok(())
    }

    #[test]
    fn test_serialized_field_names() -> Result<(), serde_json::Error> {
        let order = Order {
            order_uid: "o1".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&order)?;
        for field in [
            "order_uid",
            "track_number",
            "entry",
            "delivery",
            "payment",
            "items",
            "locale",
            "internal_signature",
            "customer_id",
            "delivery_service",
            "shardkey",
            "sm_id",
            "date_created",
            "oof_shard",
        ] {
            assert!(value.get(field).is_some(), "missing field {}", field);
        }
        Ok(())
    }
}
