use actix_web::web::Data;
use actix_web::HttpServer;
use log::info;
use sqlx::postgres::PgPoolOptions;

use agora::fingerprint::VoterSalt;
use agora::middlewares::jwt::{Identity, JWT_SECRET};
use agora::routes;
use agora::schema;

#[actix_web::main]
async fn main() -> Result<(), std::io::Error> {
    dotenv::dotenv().ok();
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,actix_web=info");
    }
    env_logger::init();
    let database_url = dotenv::var("DATABASE_URL").expect("environment variable DATABASE_URL not been set");
    let jwt_secret = dotenv::var(JWT_SECRET).expect("environment variable JWT_SECRET not been set");
    let bind_addr = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".into());
    let voter_salt = VoterSalt::from_env().expect("failed to resolve voter salt");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("failed to connect to database");
    schema::ensure_poll_tables(&pool)
        .await
        .expect("failed to ensure poll tables");
    info!("listening on {}", bind_addr);
    HttpServer::new(move || {
        actix_web::App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(Identity::new(jwt_secret.as_bytes().to_owned()))
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(voter_salt.clone()))
            .configure(routes)
    })
    .bind(bind_addr)?
    .run()
    .await
}
