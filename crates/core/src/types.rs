use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::MISSING_VALUE;

/// Where a correlation id was found.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationOrigin {
    Cookie,
    Header,
    Generated,
}

impl CorrelationOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationOrigin::Cookie => "cookie",
            CorrelationOrigin::Header => "header",
            CorrelationOrigin::Generated => "generated",
        }
    }
}

/// Opaque digit-string token linking one visitor's events across requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationId {
    value: String,
    origin: CorrelationOrigin,
}

impl CorrelationId {
    /// Byte widths of the decimal groups a fresh id is rendered from.
    pub const GROUPS: [usize; 3] = [3, 3, 2];

    pub fn new(value: impl Into<String>, origin: CorrelationOrigin) -> Self {
        Self {
            value: value.into(),
            origin,
        }
    }

    /// Accept an inbound id only if it is a non-empty digit string.
    pub fn parse(value: &str, origin: CorrelationOrigin) -> Option<Self> {
        let value = value.trim();
        is_valid_token(value).then(|| Self::new(value, origin))
    }

    /// Generate a fresh id from 8 bytes of OS randomness.
    pub fn generate() -> Self {
        Self::new(random_decimal_token(&Self::GROUPS), CorrelationOrigin::Generated)
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn origin(&self) -> CorrelationOrigin {
        self.origin
    }

    pub fn is_generated(&self) -> bool {
        self.origin == CorrelationOrigin::Generated
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Correlation ids are embedded in backend URL paths, so only digits pass.
pub fn is_valid_token(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// Draw `sum(groups)` random bytes and render each group as a big-endian
/// unsigned decimal, concatenated.
pub fn random_decimal_token(groups: &[usize]) -> String {
    let mut bytes = vec![0u8; groups.iter().sum()];
    OsRng.fill_bytes(&mut bytes);
    render_decimal_groups(&bytes, groups)
}

/// Render consecutive byte groups as concatenated decimal numbers.
/// Groups wider than 8 bytes are not supported.
pub fn render_decimal_groups(bytes: &[u8], groups: &[usize]) -> String {
    let mut out = String::new();
    let mut offset = 0;
    for &width in groups {
        let end = (offset + width).min(bytes.len());
        let value = bytes[offset..end]
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
        out.push_str(&value.to_string());
        offset = end;
    }
    out
}

/// A captured value, or the sentinel standing in for one that was absent.
/// `Missing` serializes as [`MISSING_VALUE`] so the backend always sees a
/// stable type.
#[derive(Debug, Clone, PartialEq)]
pub enum Captured<T> {
    Present(T),
    Missing,
}

impl<T> Captured<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Captured::Missing)
    }
}

impl<T> From<Option<T>> for Captured<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Captured::Present(v),
            None => Captured::Missing,
        }
    }
}

impl<T: Serialize> Serialize for Captured<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Captured::Present(v) => v.serialize(serializer),
            Captured::Missing => serializer.serialize_str(MISSING_VALUE),
        }
    }
}

/// Cart-level fields plus the visible line items.
#[derive(Debug, Clone, Serialize)]
pub struct CartSnapshot {
    pub cart_data: Captured<Value>,
    pub cart_items: Captured<Vec<Value>>,
}

impl CartSnapshot {
    pub fn missing() -> Self {
        Self {
            cart_data: Captured::Missing,
            cart_items: Captured::Missing,
        }
    }
}

/// One order with the cart it was placed from.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSnapshot {
    pub order_id: String,
    pub order_data: Value,
    pub cart: CartSnapshot,
    pub order_items: Vec<Value>,
}

/// The business event sent to the analytics backend.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub api: String,
    pub app_software_name: String,
    pub app_software_version: String,
    pub event_type: String,
    pub timestamp: i64,
    pub shop_current_currency: String,
    pub cart: Captured<CartSnapshot>,
    pub orders: Vec<OrderSnapshot>,
    pub event_number: u64,
    pub website_id: String,
    pub website_code: String,
    pub website_name: String,
    pub website_data: Value,
    pub shop_data: Value,
    pub shop_view_data: Value,
    pub shop_view_locale_code: String,
    pub shop_view_base_url: String,
    pub shop_view_home_url: String,
    pub checkout_link: String,
    pub multishipping_checkout_link: String,
    pub cart_link: String,
    pub correlation_id: String,
    pub visitor_id: Captured<Value>,
    pub visitor_data: Captured<Value>,
    pub is_logged_in: Captured<bool>,
    pub customer_id: Captured<String>,
    pub customer_data: Captured<Value>,
    pub previous_biz_event_latency: Captured<u64>,
}
