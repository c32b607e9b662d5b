mod argp;
mod error;
mod extract;
mod imap;
mod message;
mod persistence;
mod routes;
mod search;
mod summary;
mod tcpstream;

use error::{AppError, Result};
use extract::TicketRecord;
use imap::{AuthMechanism, IMAPClient};
use routes::Route;
use search::SearchPeriod;

use log::{error, info, warn};
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Debug)]
pub struct AppConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub auth: AuthMechanism,
    pub mailbox: String,
    pub sender: String,
    pub period: SearchPeriod,
    pub taxi_fare: f64,
    pub routes: Vec<Route>,
    pub attachments_root: PathBuf,
    pub output_dir: PathBuf,
    pub db_name: Option<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        error!("{}", err);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let app_config = argp::arg_parse()?;
    check_routes(&app_config)?;
    let attachment_dir = prepare_directories(&app_config)?;

    let mut client = IMAPClient::connect(&app_config.server, app_config.port)?;
    client.login(&app_config.username, &app_config.password, app_config.auth)?;
    client.select(&app_config.mailbox)?;
    info!("Connected to email");

    let criteria = search::build_search_criteria(
        &app_config.sender,
        &routes::search_keywords(&app_config.routes),
        app_config.period,
    )?;
    info!("Searching with criteria: {}", criteria);
    let email_ids = client.search(&criteria)?;
    info!("Found {} matching emails", email_ids.len());

    let email_data =
        extract::extract_email_data(&mut client, &email_ids, &app_config.routes, &attachment_dir)?;
    info!("Extracted data from {} emails", email_data.len());

    write_outputs(&email_data, &app_config)?;
    close_session(&mut client);
    Ok(())
}

fn check_routes(app_config: &AppConfig) -> Result<()> {
    if app_config.routes.is_empty() {
        return Err(AppError::Config(
            "No route configurations found. Please configure at least one route (ROUTE_1_NAME, ...)"
                .to_string(),
        ));
    }
    Ok(())
}

/// Creates `<attachments>/<YYYY>-<Mon>` and the output directory, returning
/// the former.
fn prepare_directories(app_config: &AppConfig) -> Result<PathBuf> {
    let attachment_dir = app_config.attachments_root.join(app_config.period.label());
    fs::create_dir_all(&attachment_dir)?;
    fs::create_dir_all(&app_config.output_dir)?;
    Ok(attachment_dir)
}

/// Writes the summary CSV and, when configured, the ticket database.
/// Returns the CSV path, or `None` when there was nothing to write.
fn write_outputs(email_data: &[TicketRecord], app_config: &AppConfig) -> Result<Option<PathBuf>> {
    if email_data.is_empty() {
        warn!("No email data to process");
        return Ok(None);
    }

    let rows = summary::summarize(email_data, app_config.taxi_fare);
    let output_file = app_config
        .output_dir
        .join(format!("{}-summary.csv", app_config.period.label()));
    summary::write_summary_csv(&rows, &output_file)?;
    info!("CSV summary created: {}", output_file.display());

    if let Some(db_name) = &app_config.db_name {
        let persisted = persistence::persist_tickets(email_data, db_name)?;
        info!("Persisted {} tickets in {}", persisted, db_name);
    }
    Ok(Some(output_file))
}

/// Runs after the outputs are written; a failed LOGOUT is only logged.
fn close_session(client: &mut IMAPClient) {
    if let Err(err) = client.logout() {
        warn!("Logout failed: {}", err);
    }
}
