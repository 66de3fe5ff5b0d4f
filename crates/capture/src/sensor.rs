//! Descriptor for the browser-side sensor script embedded in storefront
//! pages: where to load it from and the page variables it reads.

use bizevent_core::host::{SiteUnit, StoreDescriptor};
use bizevent_core::BizEventResult;
use serde::Serialize;

use crate::context::{InboundRequest, RequestContext};
use crate::coordinator::HookCoordinator;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorVariables {
    pub website_url: String,
    pub app_software_name: String,
    pub app_software_version: String,
    pub website_code: String,
    pub website_name: String,
    pub website_default_shop_id: Option<String>,
    pub website_is_default: Option<String>,
    pub shop_id: String,
    pub shop_name: String,
    pub shop_root_category_id: Option<String>,
    pub shop_default_shop_view_id: Option<String>,
    pub shop_view_id: String,
    pub shop_view_code: String,
    pub shop_view_name: String,
    pub shop_view_locale_code: String,
    pub shop_view_url: String,
    pub shop_view_home_url: String,
    pub checkout_link: String,
    pub multishipping_checkout_link: String,
    pub request_route_name: Option<String>,
    pub page_identifier: Option<String>,
}

impl SensorVariables {
    pub fn new(
        store: &StoreDescriptor,
        request: &InboundRequest,
        app_software_name: &str,
        app_software_version: &str,
    ) -> Self {
        Self {
            website_url: store.base_url.clone(),
            app_software_name: app_software_name.to_string(),
            app_software_version: app_software_version.to_string(),
            website_code: store.website.code.clone(),
            website_name: store.website.name.clone(),
            website_default_shop_id: attribute(&store.website, "default_group_id"),
            website_is_default: attribute(&store.website, "is_default"),
            shop_id: store.shop.id.clone(),
            shop_name: store.shop.name.clone(),
            shop_root_category_id: attribute(&store.shop, "root_category_id"),
            shop_default_shop_view_id: attribute(&store.shop, "default_store_id"),
            shop_view_id: store.shop_view.id.clone(),
            shop_view_code: store.shop_view.code.clone(),
            shop_view_name: store.shop_view.name.clone(),
            shop_view_locale_code: store.locale_code.clone(),
            shop_view_url: store.base_url.clone(),
            shop_view_home_url: store.home_url.clone(),
            checkout_link: store.checkout_url.clone(),
            multishipping_checkout_link: store.multishipping_checkout_url.clone(),
            request_route_name: request.route_name.clone(),
            page_identifier: request.page_identifier.clone(),
        }
    }
}

fn attribute(unit: &SiteUnit, key: &str) -> Option<String> {
    unit.data.get_text(key)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorDescriptor {
    pub script_url: String,
    pub variables: SensorVariables,
}

impl SensorDescriptor {
    /// Page variables as the JSON blob the script reads.
    pub fn variables_json(&self) -> BizEventResult<String> {
        Ok(serde_json::to_string(&self.variables)?)
    }
}

impl HookCoordinator {
    /// Sensor script for this page, if capture is on and an API key is set.
    /// The correlation id is resolved first so the identity cookie the
    /// script relies on goes out with this response.
    pub async fn sensor_descriptor(&self, ctx: &mut RequestContext) -> Option<SensorDescriptor> {
        let capture = &self.config().capture;
        if capture.api_key.is_empty() || !self.capturing_enabled(ctx) {
            return None;
        }
        self.ensure_correlation_id_set(ctx).await;

        let store = self.dispatcher().builder().storefront().store();
        Some(SensorDescriptor {
            script_url: self.config().sensor_script_url(),
            variables: SensorVariables::new(
                &store,
                ctx.request(),
                &capture.app_software_name,
                &capture.app_software_version,
            ),
        })
    }
}
