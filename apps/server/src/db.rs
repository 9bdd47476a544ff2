use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    // Enable WAL mode for better concurrent access
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;

    // Create migrations tracking table
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    // 001: schema (includes the partial unique index on
    // appointments(professional_id, date, time) that backstops the
    // availability calculator against concurrent bookings)
    let applied: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = '001_init'")
            .fetch_one(pool)
            .await?;

    if !applied {
        let migration_sql = include_str!("../migrations/001_init.sql");
        for statement in migration_sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed).execute(pool).await?;
            }
        }
        sqlx::query("INSERT INTO _migrations (name) VALUES ('001_init')")
            .execute(pool)
            .await?;
        tracing::info!("Applied migration: 001_init");
    }

    // 002: optional demo studio for local development
    if std::env::var("SEED_DEMO").is_ok_and(|v| v == "1") {
        let seeded: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = '002_demo_seed'")
                .fetch_one(pool)
                .await?;

        if !seeded {
            seed_demo_studio(pool).await?;
            sqlx::query("INSERT INTO _migrations (name) VALUES ('002_demo_seed')")
                .execute(pool)
                .await?;
            tracing::info!("Applied migration: 002_demo_seed");
        }
    }

    tracing::info!("Database migrations up to date");
    Ok(())
}

async fn seed_demo_studio(pool: &SqlitePool) -> anyhow::Result<()> {
    let studio_id = sqlx::query(
        "INSERT INTO studios (slug, name, description, buffer_min)
         VALUES ('demo-studio', 'Demo Studio', 'Seeded demo tenant', 15)",
    )
    .execute(pool)
    .await?
    .last_insert_rowid();

    let professional_id = sqlx::query(
        "INSERT INTO professionals (studio_id, name, specialties)
         VALUES (?, 'Alex Prado', '[\"lashes\",\"brows\"]')",
    )
    .bind(studio_id)
    .execute(pool)
    .await?
    .last_insert_rowid();

    sqlx::query(
        "INSERT INTO services (studio_id, professional_id, name, duration_min, price_cents,
                               requires_signal, signal_amount_cents, sort_order)
         VALUES (?, ?, 'Lash extension', 120, 25000, 1, 5000, 1),
                (?, ?, 'Lash refill', 60, 15000, 0, 0, 2)",
    )
    .bind(studio_id)
    .bind(professional_id)
    .bind(studio_id)
    .bind(professional_id)
    .execute(pool)
    .await?;

    // Tuesday through Saturday, 09:00-18:00 with a lunch break
    for weekday in 2..=6 {
        sqlx::query(
            "INSERT INTO working_hours (studio_id, weekday, enabled, start_time, end_time, breaks)
             VALUES (?, ?, 1, '09:00', '18:00', '[{\"start\":\"12:00\",\"end\":\"13:00\"}]')",
        )
        .bind(studio_id)
        .bind(weekday)
        .execute(pool)
        .await?;
    }

    Ok(())
}
