//! Build script for db
//!
//! Applies `migrations/` to a scratch SQLite file so the `sqlx::query!` family
//! can check every statement against the real schema at compile time.

use std::{env, error::Error, fs, path::PathBuf, str::FromStr};

use sqlx::{ConnectOptions, migrate::Migrator, sqlite::SqliteConnectOptions};

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-changed=migrations");
    println!("cargo:rerun-if-env-changed=DATABASE_URL");

    // An explicit database (or offline mode) wins over the scratch schema.
    if env::var_os("DATABASE_URL").is_some() || env::var_os("SQLX_OFFLINE").is_some() {
        return Ok(());
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let schema_path = PathBuf::from(env::var("OUT_DIR")?).join("schema.sqlite");
    if schema_path.exists() {
        fs::remove_file(&schema_path)?;
    }
    let database_url = format!("sqlite://{}", schema_path.display());

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async {
            let mut conn = SqliteConnectOptions::from_str(&database_url)?
                .create_if_missing(true)
                .connect()
                .await?;
            Migrator::new(manifest_dir.join("migrations"))
                .await?
                .run(&mut conn)
                .await?;
            Ok::<_, Box<dyn Error>>(())
        })?;

    println!("cargo:rustc-env=DATABASE_URL={database_url}");
    Ok(())
}
