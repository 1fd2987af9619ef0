#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;

pub use config::Config;

use rocket::{Build, Rocket};

/// Assemble the server: logging, application config, database connection,
/// and every API route mounted at the root.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(logging::LoggerFairing)
        .attach(config::ConfigFairing)
        .attach(config::DatabaseFairing)
        .mount("/", api::routes())
}

/// Connect to the database server named by the figment's `db_uri`.
#[cfg(test)]
pub(crate) async fn db_client() -> mongodb::Client {
    let figment = rocket::build().figment().clone();
    let db_uri = figment
        .extract_inner::<String>("db_uri")
        .expect("`db_uri` not set");
    mongodb::Client::with_uri_str(&db_uri)
        .await
        .expect("Could not connect to database")
}

/// A random database name, so concurrently-running tests cannot collide.
#[cfg(test)]
pub(crate) fn database() -> String {
    format!("test{}", rand::random::<u32>())
}

/// Build a rocket against a specific existing connection and database,
/// bypassing the connection fairing.
#[cfg(test)]
pub(crate) async fn rocket_for_db(client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    let db = client.database(db_name);
    model::mongodb::ensure_indexes_exist(&db)
        .await
        .expect("Failed to create indexes");
    rocket::build()
        .attach(config::ConfigFairing)
        .manage(client)
        .manage(db)
        .mount("/", api::routes())
}
