use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};

use crate::errors::{AppError, AppResult};
use crate::identity::{IdentityStore, Session};
use crate::models::User;
use crate::payments::{Currency, PaymentMethod, PaymentProvider, PaymentRequest, PaymentState};
use crate::storage::{JsonStore, PAYMENTS_KEY};
use crate::{log_service_error, log_service_start, log_service_success};

pub const FREE_UPLOADS_PER_MONTH: usize = 3;
pub const FREE_QUIZZES_PER_MONTH: usize = 5;

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]{9,15}$").expect("valid phone regex"));
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanDuration {
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionPlan {
    pub id: &'static str,
    pub name: &'static str,
    pub price: u64,
    pub currency: Currency,
    pub duration: PlanDuration,
    pub features: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Country {
    KE,
    UG,
    TZ,
}

impl Country {
    /// Unrecognized codes fall back to Kenya.
    pub fn parse(code: &str) -> Self {
        match code.to_uppercase().as_str() {
            "UG" => Country::UG,
            "TZ" => Country::TZ,
            _ => Country::KE,
        }
    }

    pub fn currency(self) -> Currency {
        match self {
            Country::KE => Currency::KES,
            Country::UG => Currency::UGX,
            Country::TZ => Currency::TZS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SupportedMethod {
    pub method: PaymentMethod,
    pub name: &'static str,
    pub currency: Currency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub plan_id: String,
    pub country: String,
    pub method: PaymentMethod,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_id: String,
    pub api_ref: String,
    pub user_id: uuid::Uuid,
    pub plan_id: String,
    pub amount: u64,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub state: PaymentState,
    pub checkout_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const PREMIUM_FEATURES: [&str; 7] = [
    "Unlimited PDF uploads",
    "Unlimited quiz generation",
    "Advanced analytics",
    "Flashcard generation",
    "Summary generation",
    "Export functionality",
    "Priority support",
];

pub fn subscription_plans() -> Vec<SubscriptionPlan> {
    let premium = |id: &'static str,
                   name: &'static str,
                   price: u64,
                   currency: Currency,
                   duration: PlanDuration,
                   extra: Option<&'static str>| {
        let mut features = PREMIUM_FEATURES.to_vec();
        features.extend(extra);
        SubscriptionPlan {
            id,
            name,
            price,
            currency,
            duration,
            features,
        }
    };

    vec![
        SubscriptionPlan {
            id: "free",
            name: "Free",
            price: 0,
            currency: Currency::KES,
            duration: PlanDuration::Monthly,
            features: vec![
                "3 PDF uploads per month",
                "5 quizzes per month",
                "Basic progress tracking",
                "Standard support",
            ],
        },
        premium("premium_monthly_kes", "Premium Monthly", 500, Currency::KES, PlanDuration::Monthly, None),
        premium(
            "premium_yearly_kes",
            "Premium Yearly",
            5000,
            Currency::KES,
            PlanDuration::Yearly,
            Some("2 months free"),
        ),
        premium("premium_monthly_ugx", "Premium Monthly", 20000, Currency::UGX, PlanDuration::Monthly, None),
        premium("premium_monthly_tzs", "Premium Monthly", 12000, Currency::TZS, PlanDuration::Monthly, None),
    ]
}

pub fn find_plan(plan_id: &str) -> Option<SubscriptionPlan> {
    subscription_plans().into_iter().find(|p| p.id == plan_id)
}

pub fn supported_methods(country: Country) -> Vec<SupportedMethod> {
    let currency = country.currency();
    let mobile = match country {
        Country::KE => SupportedMethod {
            method: PaymentMethod::Mpesa,
            name: "M-Pesa",
            currency,
        },
        Country::UG | Country::TZ => SupportedMethod {
            method: PaymentMethod::AirtelMoney,
            name: "Airtel Money",
            currency,
        },
    };
    vec![
        mobile,
        SupportedMethod {
            method: PaymentMethod::Card,
            name: "Credit/Debit Card",
            currency,
        },
    ]
}

/// Approximate fixed exchange rate between the three supported currencies.
fn conversion_rate(from: Currency, to: Currency) -> f64 {
    use Currency::*;
    match (from, to) {
        (KES, UGX) => 40.0,
        (KES, TZS) => 24.0,
        (UGX, KES) => 0.025,
        (UGX, TZS) => 0.6,
        (TZS, KES) => 0.042,
        (TZS, UGX) => 1.67,
        _ => 1.0,
    }
}

pub fn plan_price_in(plan: &SubscriptionPlan, currency: Currency) -> u64 {
    if plan.currency == currency {
        return plan.price;
    }
    (plan.price as f64 * conversion_rate(plan.currency, currency)).round() as u64
}

pub fn format_currency(amount: u64, currency: Currency) -> String {
    let symbol = match currency {
        Currency::KES => "KSh",
        Currency::UGX => "USh",
        Currency::TZS => "TSh",
    };

    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{} {}", symbol, grouped)
}

/// Rejects a free-tier user who already used `limit` of a feature in the
/// current calendar month. Premium users are never limited.
pub fn check_monthly_limit(
    user: &User,
    used_at: impl Iterator<Item = DateTime<Utc>>,
    limit: usize,
    feature: &str,
) -> AppResult<()> {
    if user.is_premium {
        return Ok(());
    }
    let now = Utc::now();
    let used = used_at
        .filter(|t| t.year() == now.year() && t.month() == now.month())
        .count();
    if used >= limit {
        return Err(AppError::PremiumRequired(format!(
            "Free plan allows {} {} per month",
            limit, feature
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct SubscriptionService {
    store: JsonStore,
    identity: IdentityStore,
    provider: Arc<dyn PaymentProvider>,
    public_base_url: String,
}

impl SubscriptionService {
    pub fn new(
        store: JsonStore,
        identity: IdentityStore,
        provider: Arc<dyn PaymentProvider>,
        public_base_url: String,
    ) -> Self {
        Self {
            store,
            identity,
            provider,
            public_base_url,
        }
    }

    pub async fn checkout(&self, session: &Session, request: CheckoutRequest) -> AppResult<PaymentRecord> {
        let user = self.identity.require_user(session).await?;
        log_service_start!("subscriptions", "checkout", user_id = user.id);

        let plan = find_plan(&request.plan_id)
            .ok_or_else(|| AppError::NotFound(format!("Plan '{}' not found", request.plan_id)))?;
        if plan.price == 0 {
            return Err(AppError::ValidationError(
                "The free plan does not require payment".to_string(),
            ));
        }

        let country = Country::parse(&request.country);
        if !supported_methods(country).iter().any(|m| m.method == request.method) {
            return Err(AppError::ValidationError(format!(
                "Payment method {:?} is not available in {:?}",
                request.method, country
            )));
        }

        let email = request.email.trim();
        if !EMAIL_RE.is_match(email) {
            return Err(AppError::ValidationError("A valid email is required".to_string()));
        }

        let phone_number = request
            .phone_number
            .as_deref()
            .map(|p| p.replace([' ', '-'], ""))
            .filter(|p| !p.is_empty());
        match (&phone_number, request.method) {
            (None, PaymentMethod::Card) => {}
            (None, _) => {
                return Err(AppError::ValidationError(
                    "A phone number is required for mobile money".to_string(),
                ));
            }
            (Some(phone), _) if !PHONE_RE.is_match(phone) => {
                return Err(AppError::ValidationError("Invalid phone number".to_string()));
            }
            _ => {}
        }

        let currency = country.currency();
        let now = Utc::now();
        let payment_request = PaymentRequest {
            amount: plan_price_in(&plan, currency),
            currency,
            email: email.to_string(),
            phone_number,
            method: request.method,
            api_ref: format!("sub_{}_{}", plan.id, now.timestamp_millis()),
            redirect_url: format!("{}/payment-success", self.public_base_url),
            host: self.public_base_url.clone(),
        };

        let initiated = self.provider.initiate(&payment_request).await.map_err(|e| {
            log_service_error!("subscriptions", "checkout", error = e);
            AppError::PaymentError(e.to_string())
        })?;

        let record = PaymentRecord {
            payment_id: initiated.id,
            api_ref: payment_request.api_ref,
            user_id: user.id,
            plan_id: plan.id.to_string(),
            amount: payment_request.amount,
            currency,
            method: request.method,
            state: PaymentState::Pending,
            checkout_url: initiated.checkout_url,
            created_at: now,
            updated_at: now,
        };
        self.store.append(PAYMENTS_KEY, record.clone()).await?;

        log_service_success!("subscriptions", "checkout", "checkout initiated");
        Ok(record)
    }

    /// Polls the provider; a completed payment upgrades the session's user.
    pub async fn confirm_payment(&self, session: &Session, payment_id: &str) -> AppResult<PaymentRecord> {
        let mut user = self.identity.require_user(session).await?;
        log_service_start!("subscriptions", "confirm_payment", user_id = user.id);

        let records: Vec<PaymentRecord> = self.store.read_list(PAYMENTS_KEY).await?;
        let mut record = records
            .into_iter()
            .find(|r| r.payment_id == payment_id && r.user_id == user.id)
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment_id)))?;

        let status = self.provider.status(payment_id).await.map_err(|e| {
            log_service_error!("subscriptions", "confirm_payment", error = e);
            AppError::PaymentError(e.to_string())
        })?;

        let updated_at = Utc::now();
        let state = status.state;
        self.store
            .update_list(PAYMENTS_KEY, |r: &mut PaymentRecord| {
                if r.payment_id == payment_id {
                    r.state = state;
                    r.updated_at = updated_at;
                }
            })
            .await?;
        record.state = state;
        record.updated_at = updated_at;

        if state == PaymentState::Complete && !user.is_premium {
            user.is_premium = true;
            self.identity.update_current_user(session, &user).await?;
            log_service_success!("subscriptions", "confirm_payment", "premium activated");
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Duration;

    fn user(is_premium: bool) -> User {
        User {
            id: uuid::Uuid::now_v7(),
            email: "u@example.com".to_string(),
            name: "U".to_string(),
            role: Role::Student,
            is_premium,
        }
    }

    #[test]
    fn test_plan_catalogue() {
        let plans = subscription_plans();
        assert_eq!(plans.len(), 5);
        let yearly = find_plan("premium_yearly_kes").unwrap();
        assert_eq!(yearly.price, 5000);
        assert_eq!(yearly.features.last(), Some(&"2 months free"));
        assert!(find_plan("platinum").is_none());
    }

    #[test]
    fn test_supported_methods_per_country() {
        let kenya: Vec<_> = supported_methods(Country::KE).iter().map(|m| m.method).collect();
        assert_eq!(kenya, vec![PaymentMethod::Mpesa, PaymentMethod::Card]);

        let uganda = supported_methods(Country::UG);
        assert_eq!(uganda[0].method, PaymentMethod::AirtelMoney);
        assert_eq!(uganda[0].currency, Currency::UGX);

        assert_eq!(Country::parse("zz"), Country::KE);
        assert_eq!(Country::parse("tz"), Country::TZ);
    }

    #[test]
    fn test_price_conversion() {
        let monthly = find_plan("premium_monthly_kes").unwrap();
        assert_eq!(plan_price_in(&monthly, Currency::KES), 500);
        assert_eq!(plan_price_in(&monthly, Currency::UGX), 20000);
        assert_eq!(plan_price_in(&monthly, Currency::TZS), 12000);

        let ugx = find_plan("premium_monthly_ugx").unwrap();
        assert_eq!(plan_price_in(&ugx, Currency::KES), 500);
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(500, Currency::KES), "KSh 500");
        assert_eq!(format_currency(20000, Currency::UGX), "USh 20,000");
        assert_eq!(format_currency(1234567, Currency::TZS), "TSh 1,234,567");
        assert_eq!(format_currency(0, Currency::KES), "KSh 0");
    }

    #[test]
    fn test_monthly_limit_counts_current_month_only() {
        let now = Utc::now();
        let free = user(false);

        let this_month = vec![now; 2];
        assert!(check_monthly_limit(&free, this_month.into_iter(), 3, "uploads").is_ok());

        let at_limit = vec![now; 3];
        assert!(matches!(
            check_monthly_limit(&free, at_limit.into_iter(), 3, "uploads"),
            Err(AppError::PremiumRequired(_))
        ));

        let old = vec![now - Duration::days(400); 10];
        assert!(check_monthly_limit(&free, old.into_iter(), 3, "uploads").is_ok());
    }

    #[test]
    fn test_premium_users_are_unlimited() {
        let premium = user(true);
        let used = vec![Utc::now(); 100];
        assert!(check_monthly_limit(&premium, used.into_iter(), 3, "uploads").is_ok());
    }
}
