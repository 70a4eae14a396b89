use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Tenants (stand-in for the external tenant resolver)
        CREATE TABLE IF NOT EXISTS tenants (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            plan TEXT NOT NULL CHECK (plan IN ('free', 'standard', 'enterprise')),
            fee_percent_bps INTEGER NOT NULL DEFAULT 300,
            api_key_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_tenants_api_key ON tenants(api_key_hash);

        -- Per-tenant gateway configurations
        -- secret_key is envelope-encrypted (see crypto::MasterKey)
        CREATE TABLE IF NOT EXISTS payment_gateways (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            gateway_name TEXT NOT NULL CHECK (gateway_name IN ('paystack', 'flutterwave')),
            secret_key BLOB NOT NULL,
            public_key TEXT NOT NULL,
            test_mode INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_default INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(tenant_id, gateway_name)
        );
        CREATE INDEX IF NOT EXISTS idx_gateways_tenant ON payment_gateways(tenant_id);
        -- At most one default gateway per tenant
        CREATE UNIQUE INDEX IF NOT EXISTS idx_gateways_default
            ON payment_gateways(tenant_id) WHERE is_default = 1;

        -- Orders (settlement target; merchant_subaccount drives split routing)
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            customer_email TEXT NOT NULL,
            total_minor INTEGER NOT NULL,
            currency TEXT NOT NULL,
            payment_status TEXT NOT NULL DEFAULT 'unpaid',
            payment_reference TEXT,
            paid_at INTEGER,
            merchant_subaccount TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_tenant ON orders(tenant_id);

        -- Invoices (settlement target)
        CREATE TABLE IF NOT EXISTS invoices (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            customer_email TEXT NOT NULL,
            amount_minor INTEGER NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'sent',
            payment_reference TEXT,
            paid_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_invoices_tenant ON invoices(tenant_id);

        -- Payment transactions (never deleted - audit trail)
        -- transaction_reference is the sole idempotency key; the UNIQUE
        -- constraint is what makes the orphan-webhook upsert safe under
        -- concurrent duplicate deliveries.
        CREATE TABLE IF NOT EXISTS payment_transactions (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            transaction_reference TEXT NOT NULL UNIQUE,
            amount_minor INTEGER NOT NULL,
            currency TEXT NOT NULL,
            platform_fee_minor INTEGER NOT NULL,
            merchant_amount_minor INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'success', 'failed')),
            gateway_name TEXT NOT NULL CHECK (gateway_name IN ('paystack', 'flutterwave')),
            gateway_transaction_id TEXT,
            customer_email TEXT NOT NULL,
            customer_name TEXT,
            order_id TEXT REFERENCES orders(id),
            invoice_id TEXT REFERENCES invoices(id),
            gateway_response TEXT,
            paid_at INTEGER,
            failure_reason TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            CHECK (order_id IS NULL OR invoice_id IS NULL)
        );
        CREATE INDEX IF NOT EXISTS idx_transactions_tenant ON payment_transactions(tenant_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_transactions_status ON payment_transactions(status, created_at);
        "#,
    )?;
    Ok(())
}
