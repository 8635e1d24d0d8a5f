//! Callback URL signing
//!
//! Return and webhook URLs carry the item scope as query parameters. A
//! HMAC-SHA256 over those parameters lets the entry points reject URLs whose
//! scope was edited before any remote call is made.

use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::Sha256;

use crate::error::{PaymentError, PaymentResult};
use crate::payments::types::{CallbackUrls, ItemRef};

type HmacSha256 = Hmac<Sha256>;

pub const RETURN_PATH: &str = "/payment/return";
pub const WEBHOOK_PATH: &str = "/payment/webhook";

#[derive(Clone)]
pub struct CallbackSigner {
    secret: Vec<u8>,
}

impl CallbackSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, item: &ItemRef) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(
            format!("{}|{}|{}", item.component, item.payment_area, item.item_id).as_bytes(),
        );
        mac
    }

    pub fn sign(&self, item: &ItemRef) -> String {
        hex::encode(self.mac(item).finalize().into_bytes())
    }

    /// Constant-time check of a hex signature
    pub fn verify(&self, item: &ItemRef, signature: &str) -> PaymentResult<()> {
        let provided = hex::decode(signature.trim()).map_err(|_| PaymentError::InvalidSignature)?;
        self.mac(item)
            .verify_slice(&provided)
            .map_err(|_| PaymentError::InvalidSignature)
    }

    /// Build the signed return and webhook URLs for an item
    pub fn callback_urls(&self, public_base_url: &str, item: &ItemRef) -> PaymentResult<CallbackUrls> {
        let base = public_base_url.trim_end_matches('/');
        let item_id = item.item_id.to_string();
        let signature = self.sign(item);
        let params = [
            ("component", item.component.as_str()),
            ("paymentarea", item.payment_area.as_str()),
            ("itemid", item_id.as_str()),
            ("sig", signature.as_str()),
        ];

        let build = |path: &str| {
            Url::parse_with_params(&format!("{}{}", base, path), &params)
                .map(String::from)
                .map_err(|e| PaymentError::invalid_argument(format!("invalid public base URL: {}", e)))
        };

        Ok(CallbackUrls {
            return_url: build(RETURN_PATH)?,
            exchange_url: build(WEBHOOK_PATH)?,
        })
    }
}
