//! Read-only view of the storefront's own data model.
//!
//! The host hands its domain objects over as [`Record`]s: shared, mutable
//! attribute bags that may reference each other (an order pointing at its
//! quote, a quote item pointing back at the quote). Reference cycles are
//! therefore possible and consumers must not assume a tree.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type RecordRef = Arc<Record>;

/// One attribute value of a host record.
#[derive(Debug, Clone)]
pub enum Field {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Raw text as stored by the host, not necessarily UTF-8.
    Text(Vec<u8>),
    List(Vec<Field>),
    Record(RecordRef),
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::Text(value.as_bytes().to_vec())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::Text(value.into_bytes())
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Field::Int(value)
    }
}

impl From<f64> for Field {
    fn from(value: f64) -> Self {
        Field::Float(value)
    }
}

impl From<bool> for Field {
    fn from(value: bool) -> Self {
        Field::Bool(value)
    }
}

impl From<RecordRef> for Field {
    fn from(value: RecordRef) -> Self {
        Field::Record(value)
    }
}

impl From<Vec<Field>> for Field {
    fn from(value: Vec<Field>) -> Self {
        Field::List(value)
    }
}

/// Attribute bag for a host domain object.
#[derive(Default)]
pub struct Record {
    fields: RwLock<BTreeMap<String, Field>>,
}

impl Record {
    pub fn new() -> RecordRef {
        Arc::new(Self::default())
    }

    pub fn from_fields<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> RecordRef
    where
        K: Into<String>,
        V: Into<Field>,
    {
        let map = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Arc::new(Self {
            fields: RwLock::new(map),
        })
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Field>) {
        self.fields.write().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<Field> {
        self.fields.read().get(key).cloned()
    }

    /// Lossy text view of a field, for descriptors that are plain strings.
    pub fn get_text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Field::Text(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Field::Int(i) => Some(i.to_string()),
            Field::Float(f) => Some(f.to_string()),
            Field::Bool(b) => Some(if b { "1" } else { "0" }.to_string()),
            _ => None,
        }
    }

    /// Snapshot of all attributes. The lock is released before returning so
    /// callers can walk into nested records freely.
    pub fn fields(&self) -> Vec<(String, Field)> {
        self.fields
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.read().is_empty()
    }
}

impl fmt::Debug for Record {
    // Only keys: values may lead back into this record.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.fields.read();
        f.debug_struct("Record")
            .field("keys", &fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A shopping cart ("quote") with its visible line items.
#[derive(Debug, Clone)]
pub struct Quote {
    pub id: String,
    pub data: RecordRef,
    pub visible_items: Vec<RecordRef>,
}

#[derive(Debug, Clone)]
pub struct Order {
    pub id: String,
    pub data: RecordRef,
    /// Quote the order was placed from.
    pub quote_id: Option<String>,
    pub visible_items: Vec<RecordRef>,
}

/// Catalog view of a product in a cart, with the URLs the storefront
/// resolved for it.
#[derive(Debug, Clone)]
pub struct Product {
    pub id: String,
    pub data: RecordRef,
    pub url: Option<String>,
    pub base_image_url: Option<String>,
    pub small_image_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Customer attached to a session.
#[derive(Debug, Clone)]
pub struct Customer {
    pub id: String,
    pub data: RecordRef,
    pub logged_in: bool,
}

/// Website, shop or shop view descriptor.
#[derive(Debug, Clone, Default)]
pub struct SiteUnit {
    pub id: String,
    pub code: String,
    pub name: String,
    pub data: RecordRef,
}

/// Descriptors of the store serving the current request.
#[derive(Debug, Clone, Default)]
pub struct StoreDescriptor {
    pub website: SiteUnit,
    pub shop: SiteUnit,
    pub shop_view: SiteUnit,
    pub currency_code: String,
    pub locale_code: String,
    pub base_url: String,
    pub home_url: String,
    pub checkout_url: String,
    pub multishipping_checkout_url: String,
    pub cart_url: String,
}

/// Read accessors the storefront exposes to event capture.
pub trait Storefront: Send + Sync {
    fn store(&self) -> StoreDescriptor;

    /// Active cart of the session, if it has one.
    fn active_quote(&self, session_id: &str) -> Option<Quote>;

    fn quote_by_id(&self, quote_id: &str) -> Option<Quote>;

    fn order_by_id(&self, order_id: &str) -> Option<Order>;

    /// Catalog entries for the given product ids in the current store.
    /// Unknown ids are skipped.
    fn products_by_ids(&self, product_ids: &[String]) -> Vec<Product>;

    /// Customer bound to the session, logged in or not.
    fn customer(&self, session_id: &str) -> Option<Customer>;

    /// Visitor record kept on the session (carries `visitor_id`).
    fn visitor(&self, session_id: &str) -> Option<RecordRef>;
}

/// In-memory storefront for embedding and tests.
#[derive(Default)]
pub struct StaticStorefront {
    store: RwLock<StoreDescriptor>,
    active_quotes: DashMap<String, Quote>,
    quotes: DashMap<String, Quote>,
    orders: DashMap<String, Order>,
    products: DashMap<String, Product>,
    customers: DashMap<String, Customer>,
    visitors: DashMap<String, RecordRef>,
}

impl StaticStorefront {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_store(&self, store: StoreDescriptor) {
        *self.store.write() = store;
    }

    /// Register a quote and make it the session's active cart.
    pub fn set_active_quote(&self, session_id: &str, quote: Quote) {
        self.quotes.insert(quote.id.clone(), quote.clone());
        self.active_quotes.insert(session_id.to_string(), quote);
    }

    pub fn insert_quote(&self, quote: Quote) {
        self.quotes.insert(quote.id.clone(), quote);
    }

    pub fn insert_order(&self, order: Order) {
        self.orders.insert(order.id.clone(), order);
    }

    pub fn insert_product(&self, product: Product) {
        self.products.insert(product.id.clone(), product);
    }

    pub fn set_customer(&self, session_id: &str, customer: Customer) {
        self.customers.insert(session_id.to_string(), customer);
    }

    pub fn set_visitor(&self, session_id: &str, visitor: RecordRef) {
        self.visitors.insert(session_id.to_string(), visitor);
    }
}

impl Storefront for StaticStorefront {
    fn store(&self) -> StoreDescriptor {
        self.store.read().clone()
    }

    fn active_quote(&self, session_id: &str) -> Option<Quote> {
        self.active_quotes.get(session_id).map(|q| q.clone())
    }

    fn quote_by_id(&self, quote_id: &str) -> Option<Quote> {
        self.quotes.get(quote_id).map(|q| q.clone())
    }

    fn order_by_id(&self, order_id: &str) -> Option<Order> {
        self.orders.get(order_id).map(|o| o.clone())
    }

    fn products_by_ids(&self, product_ids: &[String]) -> Vec<Product> {
        product_ids
            .iter()
            .filter_map(|id| self.products.get(id).map(|p| p.clone()))
            .collect()
    }

    fn customer(&self, session_id: &str) -> Option<Customer> {
        self.customers.get(session_id).map(|c| c.clone())
    }

    fn visitor(&self, session_id: &str) -> Option<RecordRef> {
        self.visitors.get(session_id).map(|v| v.clone())
    }
}
