use axum::middleware::from_fn_with_state;
use axum::routing::{get, patch, post};
use axum::Router;
use donation_payments::config::AppConfig;
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
use donation_payments::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let redis_client = redis::Client::open(cfg.redis_url.clone())?;

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
            behavior: std::env::var("MOCK_GATEWAY_BEHAVIOR").unwrap_or_else(|_| "REDIRECT".to_string()),
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
        transactions_repo: transactions_repo.clone(),
        donations_repo: donations_repo.clone(),
        event_log_repo: event_log_repo.clone(),
        webhook_events_repo: webhook_events_repo.clone(),
        subscriptions_repo: subscriptions_repo.clone(),
    };

    let subscription_service = SubscriptionService {
        subscriptions_repo: subscriptions_repo.clone(),
        charge_service: charge_service.clone(),
        failure_threshold: cfg.subscription_failure_threshold,
    };

    let partner_service = PartnerService {
        partner_merchants_repo: partner_merchants_repo.clone(),
        partner_payouts_repo: partner_payouts_repo.clone(),
        webhook_events_repo: webhook_events_repo.clone(),
        registry: registry.clone(),
    };

    let reconciliation = ReconciliationSweep {
        webhook_events_repo: webhook_events_repo.clone(),
        webhook_service: webhook_service.clone(),
        partner_service: partner_service.clone(),
        registry: registry.clone(),
        orphan_retry_minutes: cfg.orphan_retry_minutes,
        max_attempts: cfg.webhook_max_attempts,
    };
    tokio::spawn(reconciliation.clone().run(30));

    let state = AppState {
        charge_service,
        webhook_service,
        subscription_service,
        partner_service,
        reconciliation,
        payment_methods_repo,
        transactions_repo,
        subscriptions_repo,
        pool: pool.clone(),
        redis_client: redis::Client::open(cfg.redis_url.clone())?,
    };

    let admin_key = cfg.internal_api_key.clone();
    let admin_routes = Router::new()
        .route(
            "/methods",
            post(donation_payments::http::handlers::methods::create_method),
        )
        .route(
            "/methods/:slug",
            patch(donation_payments::http::handlers::methods::update_method),
        )
        .route(
            "/partners",
            post(donation_payments::http::handlers::partners::create_draft),
        )
        .route(
            "/partners/:id/submit",
            post(donation_payments::http::handlers::partners::submit),
        )
        .route(
            "/partners/:id/approve",
            post(donation_payments::http::handlers::partners::approve),
        )
        .route(
            "/partners/:id/reject",
            post(donation_payments::http::handlers::partners::reject),
        )
        .route(
            "/partners/:id/block",
            post(donation_payments::http::handlers::partners::block),
        )
        .route(
            "/partners/:id/reactivate",
            post(donation_payments::http::handlers::partners::reactivate),
        )
        .route(
            "/partners/:id/payouts",
            get(donation_payments::http::handlers::partners::list_payouts),
        )
        .route(
            "/subscriptions/run/:period",
            post(donation_payments::http::handlers::subscriptions::run_due_charges),
        )
        .route(
            "/subscriptions/:id",
            get(donation_payments::http::handlers::subscriptions::get_subscription),
        )
        .route(
            "/subscriptions/:id/pause",
            post(donation_payments::http::handlers::subscriptions::pause),
        )
        .route(
            "/subscriptions/:id/resume",
            post(donation_payments::http::handlers::subscriptions::resume),
        )
        .route(
            "/subscriptions/:id/cancel",
            post(donation_payments::http::handlers::subscriptions::cancel),
        )
        .route(
            "/ops/webhooks/replay",
            post(donation_payments::http::handlers::ops::replay_webhooks),
        )
        .layer(from_fn_with_state(
            admin_key,
            donation_payments::http::middleware::admin_auth::require_internal_api_key,
        ));

    // Only the donor-facing surface is rate limited; gateway callbacks and
    // the guarded admin surface are not.
    let public_routes = Router::new()
        .route(
            "/charges",
            post(donation_payments::http::handlers::charges::create_charge),
        )
        .route(
            "/transactions/:transaction_id",
            get(donation_payments::http::handlers::charges::get_transaction),
        )
        .route(
            "/methods",
            get(donation_payments::http::handlers::methods::list_methods),
        )
        .layer(from_fn_with_state(
            donation_payments::http::middleware::rate_limit::RateLimitState {
                redis_client: redis::Client::open(cfg.redis_url.clone())?,
                max_per_minute: 300,
            },
            donation_payments::http::middleware::rate_limit::enforce,
        ));

    let app = Router::new()
        .route("/health", get(donation_payments::http::handlers::charges::health))
        .route(
            "/webhooks/:provider",
            post(donation_payments::http::handlers::webhooks::gateway_webhook),
        )
        .route(
            "/webhooks/:provider/payouts",
            post(donation_payments::http::handlers::webhooks::payout_webhook),
        )
        .route("/ops/readiness", get(donation_payments::http::handlers::ops::readiness))
        .route("/ops/liveness", get(donation_payments::http::handlers::ops::liveness))
        .merge(public_routes)
        .merge(admin_routes)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
