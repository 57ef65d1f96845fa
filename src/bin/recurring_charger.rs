use anyhow::Result;
use donation_payments::config::AppConfig;
use donation_payments::domain::transaction::RecurringPeriod;
use donation_payments::gateways::mock::MockGateway;
use donation_payments::gateways::yookassa::YookassaGateway;
use donation_payments::gateways::GatewayRegistry;
use donation_payments::repo::donations_repo::DonationsRepo;
use donation_payments::repo::event_log_repo::EventLogRepo;
use donation_payments::repo::partner_merchants_repo::PartnerMerchantsRepo;
use donation_payments::repo::partner_payouts_repo::PartnerPayoutsRepo;
use donation_payments::repo::payment_methods_repo::PaymentMethodsRepo;
use donation_payments::repo::subscriptions_repo::SubscriptionsRepo;
use donation_payments::repo::transactions_repo::TransactionsRepo;
use donation_payments::repo::webhook_events_repo::WebhookEventsRepo;
use donation_payments::service::charge_service::ChargeService;
use donation_payments::service::partner_service::PartnerService;
use donation_payments::service::reconciliation::ReconciliationSweep;
use donation_payments::service::subscription_service::SubscriptionService;
use donation_payments::service::webhook_service::WebhookService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Timer-driven collaborator: runs due subscription charges for every
/// period and replays unresolved webhook events.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&cfg.database_url)
        .await?;

    let mut registry = GatewayRegistry::new();
    registry.register(
        "yookassa",
        Arc::new(YookassaGateway {
            base_url: cfg.gateway_base_url.clone(),
            shop_id: cfg.gateway_shop_id.clone(),
            secret_key: cfg.gateway_secret_key.clone(),
            webhook_secret: cfg.gateway_webhook_secret.clone(),
            timeout_ms: cfg.gateway_timeout_ms,
            client: reqwest::Client::new(),
        }),
    );
    registry.register(
        "mock",
        Arc::new(MockGateway {
            behavior: std::env::var("MOCK_GATEWAY_BEHAVIOR").unwrap_or_else(|_| "IMMEDIATE_SUCCESS".to_string()),
        }),
    );

    let transactions_repo = TransactionsRepo { pool: pool.clone() };
    let donations_repo = DonationsRepo { pool: pool.clone() };
    let event_log_repo = EventLogRepo { pool: pool.clone() };
    let payment_methods_repo = PaymentMethodsRepo { pool: pool.clone() };
    let webhook_events_repo = WebhookEventsRepo { pool: pool.clone() };
    let subscriptions_repo = SubscriptionsRepo { pool: pool.clone() };
    let partner_merchants_repo = PartnerMerchantsRepo { pool: pool.clone() };
    let partner_payouts_repo = PartnerPayoutsRepo { pool: pool.clone() };

    let charge_service = ChargeService {
        pool: pool.clone(),
        transactions_repo: transactions_repo.clone(),
        donations_repo: donations_repo.clone(),
        event_log_repo: event_log_repo.clone(),
        payment_methods_repo: payment_methods_repo.clone(),
        partner_merchants_repo: partner_merchants_repo.clone(),
        subscriptions_repo: subscriptions_repo.clone(),
        registry: registry.clone(),
        charge_expiry_minutes: cfg.charge_expiry_minutes,
    };

    let webhook_service = WebhookService {
        registry: registry.clone(),
        transactions_repo,
        donations_repo,
        event_log_repo,
        webhook_events_repo: webhook_events_repo.clone(),
        subscriptions_repo: subscriptions_repo.clone(),
    };

    let partner_service = PartnerService {
        partner_merchants_repo,
        partner_payouts_repo,
        webhook_events_repo: webhook_events_repo.clone(),
        registry: registry.clone(),
    };

    let subscription_service = SubscriptionService {
        subscriptions_repo,
        charge_service,
        failure_threshold: cfg.subscription_failure_threshold,
    };

    let sweep = ReconciliationSweep {
        webhook_events_repo,
        webhook_service,
        partner_service,
        registry,
        orphan_retry_minutes: cfg.orphan_retry_minutes,
        max_attempts: cfg.webhook_max_attempts,
    };

    loop {
        for period in [RecurringPeriod::Daily, RecurringPeriod::Weekly, RecurringPeriod::Monthly] {
            match subscription_service.run_due_charges(period).await {
                Ok(stats) if stats.charged > 0 => {
                    tracing::info!(period = period.as_str(), ?stats, "subscription run");
                }
                Ok(_) => {}
                Err(err) => tracing::error!(period = period.as_str(), "subscription run error: {err:#}"),
            }
        }

        if let Err(err) = sweep.replay_unprocessed(100).await {
            tracing::error!("webhook replay error: {err:#}");
        }
        if let Err(err) = sweep.expire_stale_charges(100).await {
            tracing::error!("charge expiry error: {err:#}");
        }

        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
    }
}
