use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use handlebars::Handlebars;
use log::*;
use tide::sessions::{MemoryStore, SessionMiddleware};
use tide::utils::After;
use tide::Server;

mod accounts;
mod api_models;
mod config;
mod db;
mod error;
mod forms;
mod learning;
mod mail;
mod models;
mod pagination;
mod polls;
mod routes;
mod seed;
mod session;
mod templates;
mod uploads;

use crate::config::Config;
use crate::db::Databases;
use crate::mail::{Mailer, SmtpMailer};

/**
 * Struct for carrying application state into tide request handlers
 */
#[derive(Clone)]
pub struct AppState {
    pub dbs: Databases,
    pub templates: Arc<Handlebars<'static>>,
    pub mailer: Arc<dyn Mailer>,
    pub media_root: Arc<PathBuf>,
}

/**
 * Middleware stack and route table around a ready state
 */
pub fn build_app(state: AppState, session_secret: &[u8], login_required: bool) -> std::io::Result<Server<AppState>> {
    std::fs::create_dir_all(state.media_root.as_ref())?;
    let media_root = state.media_root.clone();

    let mut app = tide::with_state(state);
    app.with(After(error::map_app_errors));
    app.with(
        SessionMiddleware::new(MemoryStore::new(), session_secret)
            .with_cookie_name("sessionid")
            .without_save_unchanged(),
    );
    if login_required {
        app.with(session::LoginRequired::default());
    }
    routes::mount(&mut app, media_root.as_ref())?;
    Ok(app)
}

#[derive(Parser)]
#[command(name = "polls-site", about = "Polls, accounts and the pizza playground")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the site (the default)
    Serve,
    /// Fill the databases with tags, toppings and sample polls
    Seed {
        #[arg(long, default_value_t = 20)]
        polls: usize,
    },
    /// Give a user a permission, e.g. `learning.add_pizza`
    Grant { username: String, codename: String },
}

#[async_std::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let config = Config::load()?;

    let dbs = match Databases::connect(&config.database_url, &config.secondary_database_url).await {
        Ok(dbs) => dbs,
        Err(err) => {
            error!("Could not initialize pools! {:?}", err);
            return Err(err.into());
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Seed { polls } => {
            seed::run(&dbs, polls).await?;
            Ok(())
        }
        Command::Grant { username, codename } => {
            let user = accounts::find_by_username(&dbs, &username)
                .await?
                .ok_or_else(|| error::AppError::not_found("user", &username))?;
            accounts::grant_permission(&dbs, user.id, &codename).await?;
            info!("Granted {} to {}", codename, username);
            Ok(())
        }
        Command::Serve => {
            let state = AppState {
                dbs,
                templates: Arc::new(templates::registry(&config.template_dir)?),
                mailer: Arc::new(SmtpMailer::new(&config.smtp_host, config.smtp_port)),
                media_root: Arc::new(config.media_root.clone()),
            };
            let app = build_app(state, config.session_secret.as_bytes(), config.login_required)?;
            info!("Listening on {}", config.bind_address);
            app.listen(config.bind_address.clone()).await?;
            Ok(())
        }
    }
}
