//! Return and webhook entry points
//!
//! Both re-fetch the transaction from the processor, reconcile it and then
//! branch on the processor's status class. Neither ever fails the HTTP
//! interaction: the return handler always yields a redirect, the webhook
//! handler always yields a status line.

use reqwest::Url;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};

use crate::error::{PaymentError, PaymentResult};
use crate::payments::reconcile::ReconciliationEngine;
use crate::payments::signing::CallbackSigner;
use crate::payments::types::{ItemRef, RemoteObservation, StatusClass, WebhookRequest};

/// Scope parameters carried by the signed callback URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub component: String,
    pub payment_area: String,
    pub item_id: i64,
    /// Hex HMAC over the three scope fields
    pub signature: String,
}

impl CallbackParams {
    /// Read the scope parameters from a decoded query string
    pub fn from_query(query: &HashMap<String, String>) -> PaymentResult<Self> {
        let field = |name: &str| {
            query
                .get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| PaymentError::invalid_argument(format!("missing {} parameter", name)))
        };

        let item_id = field("itemid")?
            .parse::<i64>()
            .map_err(|_| PaymentError::invalid_argument("itemid must be an integer"))?;

        Ok(Self {
            component: field("component")?,
            payment_area: field("paymentarea")?,
            item_id,
            signature: query.get("sig").cloned().unwrap_or_default(),
        })
    }

    pub fn item(&self) -> ItemRef {
        ItemRef {
            component: self.component.clone(),
            payment_area: self.payment_area.clone(),
            item_id: self.item_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

impl NoticeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeLevel::Success => "success",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        }
    }
}

/// User-facing notice attached to the return redirect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    PaymentSuccessful,
    PaymentPending,
    PaymentCancelled,
    CannotProcessStatus,
    TransactionRecordNotFound,
    UnknownError,
}

impl Notice {
    pub fn key(&self) -> &'static str {
        match self {
            Notice::PaymentSuccessful => "paymentsuccessful",
            Notice::PaymentPending => "paymentpending",
            Notice::PaymentCancelled => "paymentcancelled",
            Notice::CannotProcessStatus => "cannotprocessstatus",
            Notice::TransactionRecordNotFound => "transactionrecordnotfound",
            Notice::UnknownError => "unknownerror",
        }
    }

    pub fn level(&self) -> NoticeLevel {
        match self {
            Notice::PaymentSuccessful => NoticeLevel::Success,
            Notice::PaymentPending | Notice::PaymentCancelled | Notice::CannotProcessStatus => {
                NoticeLevel::Warning
            }
            Notice::TransactionRecordNotFound | Notice::UnknownError => NoticeLevel::Error,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Notice::PaymentSuccessful => "Your payment was successful",
            Notice::PaymentPending => {
                "Your payment is pending. We will process the payment status later"
            }
            Notice::PaymentCancelled => "Your payment was cancelled",
            Notice::CannotProcessStatus => {
                "Your payment has a status we cannot (yet) process. Please contact system administrator"
            }
            Notice::TransactionRecordNotFound => {
                "Reference to this payment cannot be found in our system."
            }
            Notice::UnknownError => {
                "An unknown error has occurred. Please contact the system administrator."
            }
        }
    }
}

/// Where the payer is sent after returning from the processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnOutcome {
    pub target: String,
    pub notice: Notice,
}

impl ReturnOutcome {
    /// Target URL with the notice key and level appended as query parameters
    pub fn redirect_url(&self) -> String {
        match Url::parse(&self.target) {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair("notice", self.notice.key())
                    .append_pair("level", self.notice.level().as_str());
                url.into()
            }
            Err(_) => self.target.clone(),
        }
    }
}

/// Status line returned to the processor's exchange call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookReply {
    Delivered,
    Updated,
    Unprocessable { status_name: String },
    RecordMissing,
    Failed { message: String },
}

impl WebhookReply {
    /// Whether the processor should consider the notification handled
    pub fn accepted(&self) -> bool {
        matches!(
            self,
            WebhookReply::Delivered | WebhookReply::Updated | WebhookReply::RecordMissing
        )
    }
}

impl fmt::Display for WebhookReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebhookReply::Delivered => write!(f, "TRUE|payment processed; order delivered."),
            WebhookReply::Updated => write!(f, "TRUE|payment status updated."),
            WebhookReply::Unprocessable { status_name } => write!(
                f,
                "false|payment status updated but system cannot process {}",
                status_name
            ),
            WebhookReply::RecordMissing => write!(
                f,
                "TRUE|payment not processed: cannot locate internal transaction record."
            ),
            WebhookReply::Failed { message } => write!(f, "false|error:{}", message),
        }
    }
}

pub struct CallbackService {
    engine: Arc<ReconciliationEngine>,
    signer: CallbackSigner,
    site_root: String,
}

impl CallbackService {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        signer: CallbackSigner,
        site_root: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            signer,
            site_root: site_root.into(),
        }
    }

    /// Handle the payer's browser coming back from the processor
    ///
    /// Any status the processor put on the return URL is ignored; the status is
    /// fetched again before reconciling.
    pub async fn handle_return(&self, params: &CallbackParams, order_id: &str) -> ReturnOutcome {
        let item = params.item();
        match self.reconcile_return(&item, &params.signature, order_id).await {
            Ok(observation) => match observation.class() {
                StatusClass::Paid => ReturnOutcome {
                    target: self.success_target(&item).await,
                    notice: Notice::PaymentSuccessful,
                },
                StatusClass::Pending => self.to_root(Notice::PaymentPending),
                StatusClass::Canceled => self.to_root(Notice::PaymentCancelled),
                StatusClass::Other => self.to_root(Notice::CannotProcessStatus),
            },
            Err(e) if e.is_not_found() => {
                warn!(order_id, "Return for unknown transaction");
                self.to_root(Notice::TransactionRecordNotFound)
            }
            Err(e) => {
                error!(order_id, error = %e, "Return reconciliation failed");
                self.to_root(Notice::UnknownError)
            }
        }
    }

    /// Handle a server-to-server status notification from the processor
    pub async fn handle_webhook(
        &self,
        params: &CallbackParams,
        request: &WebhookRequest,
    ) -> WebhookReply {
        match self.reconcile_webhook(params, request).await {
            Ok(observation) => match observation.class() {
                StatusClass::Paid => WebhookReply::Delivered,
                StatusClass::Pending | StatusClass::Canceled => WebhookReply::Updated,
                StatusClass::Other => WebhookReply::Unprocessable {
                    status_name: observation.status_name,
                },
            },
            Err(e) if e.is_not_found() => {
                warn!(order_id = ?request.order_id(), "Webhook for unknown transaction");
                WebhookReply::RecordMissing
            }
            Err(e) => {
                error!(order_id = ?request.order_id(), error = %e, "Webhook reconciliation failed");
                WebhookReply::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn reconcile_return(
        &self,
        item: &ItemRef,
        signature: &str,
        order_id: &str,
    ) -> PaymentResult<RemoteObservation> {
        self.signer.verify(item, signature)?;
        if order_id.is_empty() {
            return Err(PaymentError::invalid_argument("missing orderId"));
        }
        let observation = self.engine.fetch_observation(item, order_id).await?;
        self.engine.reconcile(Some(observation), None).await
    }

    async fn reconcile_webhook(
        &self,
        params: &CallbackParams,
        request: &WebhookRequest,
    ) -> PaymentResult<RemoteObservation> {
        let item = params.item();
        self.signer.verify(&item, &params.signature)?;
        let observation = self.engine.observe_webhook(&item, request).await?;
        self.engine.reconcile(Some(observation), None).await
    }

    async fn success_target(&self, item: &ItemRef) -> String {
        match self.engine.payables().success_url(item).await {
            Ok(Some(url)) => url,
            Ok(None) => self.site_root.clone(),
            Err(e) => {
                warn!(error = %e, "Could not resolve success URL; using site root");
                self.site_root.clone()
            }
        }
    }

    /// Redirect used when the return request itself is malformed
    pub fn rejected(&self) -> ReturnOutcome {
        self.to_root(Notice::UnknownError)
    }

    fn to_root(&self, notice: Notice) -> ReturnOutcome {
        ReturnOutcome {
            target: self.site_root.clone(),
            notice,
        }
    }
}
