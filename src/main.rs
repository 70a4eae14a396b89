use std::sync::Arc;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paydesk::config::Config;
use paydesk::db::{create_pool, init_db, queries, AppState};
use paydesk::email::EmailNotifier;
use paydesk::gateways::LiveGatewayFactory;
use paydesk::handlers;
use paydesk::models::{CreateTenant, Plan, UpsertGateway};
use paydesk::reconcile;

#[derive(Parser, Debug)]
#[command(name = "paydesk")]
#[command(about = "Payment transaction reconciliation for a multi-tenant commerce back office")]
struct Cli {
    /// Seed the database with dev data (tenant, gateway, order, invoice)
    #[arg(long)]
    seed: bool,
}

/// Seeds the database with dev data for testing.
/// Only runs in dev mode and when the database is empty.
fn seed_dev_data(state: &AppState) {
    let mut conn = state.db.get().expect("Failed to get db connection for seeding");

    let existing: i64 = conn
        .query_row("SELECT COUNT(*) FROM tenants", [], |row| row.get(0))
        .expect("Failed to count tenants");
    if existing > 0 {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    let api_key = queries::generate_api_key();
    let tenant = queries::create_tenant(
        &conn,
        &CreateTenant {
            name: "Dev Store".to_string(),
            plan: Plan::Standard,
            fee_percent_bps: None,
        },
        &api_key,
    )
    .expect("Failed to create dev tenant");

    queries::upsert_gateway(
        &mut conn,
        &tenant.id,
        &UpsertGateway {
            gateway_name: paydesk::models::GatewayName::Paystack,
            secret_key: "sk_test_xxx".to_string(),
            public_key: "pk_test_xxx".to_string(),
            test_mode: true,
            is_active: true,
            is_default: true,
        },
        &state.master_key,
    )
    .expect("Failed to create dev gateway");

    let order = queries::create_order(
        &conn,
        &tenant.id,
        "buyer@example.com",
        105_000,
        "NGN",
        Some("ACCT_dev_subaccount"),
    )
    .expect("Failed to create dev order");

    let invoice = queries::create_invoice(&conn, &tenant.id, "client@example.com", 250_000, "NGN")
        .expect("Failed to create dev invoice");

    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED");
    tracing::info!("============================================");

    println!();
    println!("--- COPY FROM HERE ---");
    println!("  tenant_id: {}", tenant.id);
    println!("  api_key: {}", api_key);
    println!("  order_id: {}", order.id);
    println!("  invoice_id: {}", invoice.id);
    println!("--- END COPY ---");
    println!();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paydesk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let master_key = config.load_master_key().expect("Failed to load master key");

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let state = AppState {
        db: db_pool,
        base_url: config.base_url.clone(),
        master_key,
        fee_cap_minor: config.fee_cap_minor,
        notifier: Arc::new(EmailNotifier::new(
            config.resend_api_key.clone(),
            config.email_from.clone(),
        )),
        gateways: Arc::new(LiveGatewayFactory),
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set PAYDESK_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    // Re-verify stuck pending transactions in the background.
    reconcile::spawn_pending_sweep(
        state.clone(),
        config.sweep_interval_secs,
        config.sweep_min_age_secs,
    );

    let app = handlers::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Paydesk server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
