//! Cache key layout
//!
//! All keys live under the `paynl:` namespace so the bridge can share a Redis
//! instance with the host platform.

use crate::payments::types::ItemRef;

const NAMESPACE: &str = "paynl";

/// Gateway credentials for the merchant account an item is sold through
pub fn credentials(item: &ItemRef) -> String {
    format!(
        "{}:credentials:{}:{}:{}",
        NAMESPACE, item.component, item.payment_area, item.item_id
    )
}
