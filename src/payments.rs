use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Currency {
    KES,
    UGX,
    TZS,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentMethod {
    #[serde(rename = "MPESA")]
    Mpesa,
    #[serde(rename = "AIRTEL-MONEY")]
    AirtelMoney,
    #[serde(rename = "CARD")]
    Card,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentState {
    Pending,
    Complete,
    Failed,
}

/// Checkout request body in the provider's wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: u64,
    pub currency: Currency,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub method: PaymentMethod,
    pub api_ref: String,
    pub redirect_url: String,
    pub host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatedPayment {
    pub id: String,
    #[serde(alias = "url")]
    pub checkout_url: String,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub id: String,
    pub state: PaymentState,
    #[serde(default)]
    pub api_ref: Option<String>,
    #[serde(default)]
    pub failed_reason: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// External payment gateway: start a checkout, then poll its state.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn initiate(&self, request: &PaymentRequest) -> Result<InitiatedPayment>;
    async fn status(&self, payment_id: &str) -> Result<PaymentStatus>;
    fn provider_name(&self) -> &'static str;
}

/// IntaSend checkout API over HTTPS.
#[derive(Debug, Clone)]
pub struct IntaSendProvider {
    client: Client,
    public_key: String,
    base_url: String,
}

impl IntaSendProvider {
    pub fn new(public_key: String, is_test: bool, base_url: Option<String>) -> Self {
        let default_url = if is_test {
            "https://sandbox.intasend.com/api/v1"
        } else {
            "https://payment.intasend.com/api/v1"
        };
        Self {
            client: Client::new(),
            public_key,
            base_url: base_url.unwrap_or_else(|| default_url.to_string()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PaymentProvider for IntaSendProvider {
    async fn initiate(&self, request: &PaymentRequest) -> Result<InitiatedPayment> {
        info!(
            provider = self.provider_name(),
            api_ref = %request.api_ref,
            amount = request.amount,
            currency = ?request.currency,
            "Initiating payment checkout"
        );

        let response = self
            .client
            .post(format!("{}/checkout/", self.base_url))
            .header("Content-Type", "application/json")
            .header("X-IntaSend-Public-Key-Test", &self.public_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = self.provider_name(),
                status = %status,
                error = %error_text,
                "Payment initiation failed"
            );
            return Err(anyhow::anyhow!("Payment initiation failed: {}", status));
        }

        Ok(response.json().await?)
    }

    async fn status(&self, payment_id: &str) -> Result<PaymentStatus> {
        let response = self
            .client
            .get(format!("{}/payments/{}/", self.base_url, payment_id))
            .header("X-IntaSend-Public-Key-Test", &self.public_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            error!(
                provider = self.provider_name(),
                payment_id = %payment_id,
                status = %status,
                "Payment status check failed"
            );
            return Err(anyhow::anyhow!("Payment status check failed: {}", status));
        }

        Ok(response.json().await?)
    }

    fn provider_name(&self) -> &'static str {
        "IntaSend"
    }
}

/// Settles every checkout after a fixed delay with a preset outcome.
#[derive(Debug, Clone)]
pub struct MockPaymentProvider {
    delay: Duration,
    outcome: PaymentState,
}

impl MockPaymentProvider {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            outcome: PaymentState::Complete,
        }
    }

    pub fn with_outcome(delay: Duration, outcome: PaymentState) -> Self {
        Self { delay, outcome }
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn initiate(&self, request: &PaymentRequest) -> Result<InitiatedPayment> {
        let id = Uuid::new_v4().simple().to_string();
        info!(
            provider = self.provider_name(),
            api_ref = %request.api_ref,
            payment_id = %id,
            "Simulating payment checkout"
        );
        Ok(InitiatedPayment {
            checkout_url: format!("https://sandbox.intasend.com/checkout/{}/", id),
            id,
            signature: None,
        })
    }

    async fn status(&self, payment_id: &str) -> Result<PaymentStatus> {
        tokio::time::sleep(self.delay).await;
        Ok(PaymentStatus {
            id: payment_id.to_string(),
            state: self.outcome,
            api_ref: None,
            failed_reason: (self.outcome == PaymentState::Failed)
                .then(|| "Simulated payment failure".to_string()),
            updated_at: Some(Utc::now()),
        })
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
