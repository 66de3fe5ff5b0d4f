//! Business event assembly.
//!
//! The builder only reads: it pulls cart, order, customer and store state
//! from the [`Storefront`] and turns it into an [`EventEnvelope`]. Sequence
//! numbers and timestamps on the session are the dispatcher's concern.

use bizevent_core::config::CaptureConfig;
use bizevent_core::host::{Order, Quote, RecordRef, SiteUnit, Storefront};
use bizevent_core::types::{CartSnapshot, OrderSnapshot};
use bizevent_core::{
    BizEventResult, Captured, Clock, CorrelationId, EventEnvelope, SessionHandle, MISSING_VALUE,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::encode::Encoder;

/// Key under `cart_data` holding the catalog view of the cart's products.
pub const PRODUCTS_INFO_KEY: &str = "cd_all_products_info";

/// Objects the host attached to the hook that fired.
#[derive(Debug, Clone, Default)]
pub struct HookData {
    /// Cart the hook was about; preferred over the session's active cart.
    pub quote: Option<Quote>,
    /// Order object passed directly, used when no ids are given.
    pub order: Option<Order>,
    pub order_ids: Vec<String>,
}

impl HookData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(mut self, quote: Quote) -> Self {
        self.quote = Some(quote);
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_order_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_ids = ids.into_iter().map(Into::into).collect();
        self
    }
}

pub struct EventBuilder {
    storefront: Arc<dyn Storefront>,
    clock: Arc<dyn Clock>,
    api_key: String,
    app_software_name: String,
    app_software_version: String,
}

impl EventBuilder {
    pub fn new(
        storefront: Arc<dyn Storefront>,
        clock: Arc<dyn Clock>,
        config: &CaptureConfig,
    ) -> Self {
        Self {
            storefront,
            clock,
            api_key: config.api_key.clone(),
            app_software_name: config.app_software_name.clone(),
            app_software_version: config.app_software_version.clone(),
        }
    }

    pub fn storefront(&self) -> &Arc<dyn Storefront> {
        &self.storefront
    }

    /// Build and serialize one event.
    pub fn build_event(
        &self,
        event_type: &str,
        hook: &HookData,
        sequence_no: u64,
        correlation_id: &CorrelationId,
        session: Option<&SessionHandle>,
    ) -> BizEventResult<String> {
        let envelope =
            self.build_envelope(event_type, hook, sequence_no, correlation_id, session);
        Ok(serde_json::to_string(&envelope)?)
    }

    pub fn build_envelope(
        &self,
        event_type: &str,
        hook: &HookData,
        sequence_no: u64,
        correlation_id: &CorrelationId,
        session: Option<&SessionHandle>,
    ) -> EventEnvelope {
        let store = self.storefront.store();
        let session_id = session.map(SessionHandle::id);

        let cart = hook
            .quote
            .clone()
            .or_else(|| session_id.and_then(|id| self.storefront.active_quote(id)))
            .map(|quote| self.cart_snapshot(&quote));

        let (visitor_id, visitor_data) = self.visitor(session_id);
        let (is_logged_in, customer_id, customer_data) = self.customer(session_id);

        EventEnvelope {
            api: self.api_key.clone(),
            app_software_name: self.app_software_name.clone(),
            app_software_version: self.app_software_version.clone(),
            event_type: event_type.to_string(),
            timestamp: self.clock.now().timestamp(),
            shop_current_currency: store.currency_code.clone(),
            cart: cart.into(),
            orders: self.orders(hook),
            event_number: sequence_no,
            website_id: store.website.id.clone(),
            website_code: store.website.code.clone(),
            website_name: store.website.name.clone(),
            website_data: site_data(&store.website),
            shop_data: site_data(&store.shop),
            shop_view_data: site_data(&store.shop_view),
            shop_view_locale_code: store.locale_code,
            shop_view_base_url: store.base_url,
            shop_view_home_url: store.home_url,
            checkout_link: store.checkout_url,
            multishipping_checkout_link: store.multishipping_checkout_url,
            cart_link: store.cart_url,
            correlation_id: correlation_id.as_str().to_string(),
            visitor_id,
            visitor_data,
            is_logged_in,
            customer_id,
            customer_data,
            previous_biz_event_latency: Captured::Missing,
        }
    }

    fn orders(&self, hook: &HookData) -> Vec<OrderSnapshot> {
        if hook.order_ids.is_empty() {
            return hook
                .order
                .iter()
                .map(|order| self.order_snapshot(order))
                .collect();
        }

        hook.order_ids
            .iter()
            .filter_map(|id| {
                let order = self.storefront.order_by_id(id);
                if order.is_none() {
                    debug!(order_id = %id, "Order named by hook not found");
                }
                order
            })
            .map(|order| self.order_snapshot(&order))
            .collect()
    }

    fn order_snapshot(&self, order: &Order) -> OrderSnapshot {
        let mut encoder = Encoder::new();
        let order_data = encoder.encode_record(&order.data);
        let order_items = encoder.encode_records(&order.visible_items);
        let cart = order
            .quote_id
            .as_deref()
            .and_then(|id| self.storefront.quote_by_id(id))
            .map(|quote| self.cart_snapshot(&quote))
            .unwrap_or_else(CartSnapshot::missing);

        OrderSnapshot {
            order_id: order.id.clone(),
            order_data,
            cart,
            order_items,
        }
    }

    fn cart_snapshot(&self, quote: &Quote) -> CartSnapshot {
        let mut encoder = Encoder::new();
        let mut cart_data = encoder.encode_record(&quote.data);
        let cart_items = encoder.encode_records(&quote.visible_items);

        let product_ids = product_ids(&quote.visible_items);
        if !product_ids.is_empty() {
            if let Value::Object(map) = &mut cart_data {
                map.insert(
                    PRODUCTS_INFO_KEY.to_string(),
                    Value::Array(self.products_info(&product_ids)),
                );
            }
        }

        CartSnapshot {
            cart_data: Captured::Present(cart_data),
            cart_items: Captured::Present(cart_items),
        }
    }

    fn products_info(&self, product_ids: &[String]) -> Vec<Value> {
        let mut encoder = Encoder::new();
        self.storefront
            .products_by_ids(product_ids)
            .iter()
            .map(|product| {
                let mut info = match encoder.encode_record(&product.data) {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                info.insert("cd_product_url".into(), url_value(&product.url));
                info.insert("cd_base_image_url".into(), url_value(&product.base_image_url));
                info.insert("cd_small_image_url".into(), url_value(&product.small_image_url));
                info.insert("cd_thumbnail_url".into(), url_value(&product.thumbnail_url));
                Value::Object(info)
            })
            .collect()
    }

    fn visitor(&self, session_id: Option<&str>) -> (Captured<Value>, Captured<Value>) {
        let Some(record) = session_id.and_then(|id| self.storefront.visitor(id)) else {
            return (Captured::Missing, Captured::Missing);
        };
        let mut encoder = Encoder::new();
        let visitor_id = record
            .get("visitor_id")
            .map(|field| encoder.encode_field(&field));
        let visitor_data = encoder.encode_record(&record);
        (visitor_id.into(), Captured::Present(visitor_data))
    }

    fn customer(
        &self,
        session_id: Option<&str>,
    ) -> (Captured<bool>, Captured<String>, Captured<Value>) {
        let Some(session_id) = session_id else {
            return (Captured::Missing, Captured::Missing, Captured::Missing);
        };
        match self.storefront.customer(session_id) {
            Some(customer) => (
                Captured::Present(customer.logged_in),
                Captured::Present(customer.id.clone()),
                Captured::Present(Encoder::new().encode_record(&customer.data)),
            ),
            None => (Captured::Present(false), Captured::Missing, Captured::Missing),
        }
    }
}

/// Distinct `product_id`s of the cart items, in item order.
fn product_ids(items: &[RecordRef]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in items.iter().filter_map(|item| item.get_text("product_id")) {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

fn url_value(url: &Option<String>) -> Value {
    Value::String(url.clone().unwrap_or_else(|| MISSING_VALUE.to_string()))
}

fn site_data(unit: &SiteUnit) -> Value {
    Encoder::new().encode_record(&unit.data)
}
