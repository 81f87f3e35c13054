use crate::entities::{link_clicks, short_links, uploads, user_settings, users, view_logs};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::env;
use std::time::Duration;
use tracing::{info, warn};

pub async fn setup_database() -> anyhow::Result<DatabaseConnection> {
    let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://filehost.db?mode=rwc".into());

    info!("📂 Database: {}", db_url);

    let mut opt = ConnectOptions::new(&db_url);
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

/// Create any missing tables from the entity definitions.
///
/// The unique index on `uploads.code` and `short_links.code` comes from the
/// entity attributes and is what makes concurrent code allocation safe.
pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    info!("🔄 Running SeaORM schema sync...");
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let stmts = vec![
        schema
            .create_table_from_entity(users::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(user_settings::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(uploads::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(view_logs::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(short_links::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(link_clicks::Entity)
            .if_not_exists()
            .to_owned(),
    ];

    for stmt in stmts {
        db.execute(builder.build(&stmt)).await?;
    }

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_uploads_user_id ON uploads(user_id);",
        "CREATE INDEX IF NOT EXISTS idx_view_logs_upload_id ON view_logs(upload_id);",
        "CREATE INDEX IF NOT EXISTS idx_short_links_user_id ON short_links(user_id);",
        "CREATE INDEX IF NOT EXISTS idx_link_clicks_short_link_id ON link_clicks(short_link_id);",
    ];

    for sql in indexes {
        if let Err(e) = db
            .execute(sea_orm::Statement::from_string(builder, sql.to_string()))
            .await
        {
            warn!("Failed to create index ({}): {}", sql, e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, Statement};

    #[tokio::test]
    async fn test_migrations_are_idempotent_and_create_indexes() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        run_migrations(&db).await.unwrap();
        run_migrations(&db).await.unwrap();

        let rows = db
            .query_all(Statement::from_string(
                DbBackend::Sqlite,
                "SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%';"
                    .to_string(),
            ))
            .await
            .unwrap();
        let mut names: Vec<String> = rows
            .iter()
            .map(|row| row.try_get::<String>("", "name").unwrap())
            .collect();
        names.sort();

        assert_eq!(
            names,
            vec![
                "idx_link_clicks_short_link_id",
                "idx_short_links_user_id",
                "idx_uploads_user_id",
                "idx_view_logs_upload_id",
            ]
        );
    }
}
