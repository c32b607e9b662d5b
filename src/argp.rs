extern crate clap;

use crate::error::{AppError, Result};
use crate::imap::AuthMechanism;
use crate::routes::load_routes;
use crate::search::SearchPeriod;
use crate::AppConfig;

use clap::{App, Arg, ArgMatches};
use std::env;
use std::path::PathBuf;

fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("fare-summary")
        .version("1.0.0")
        .about("Builds a daily train ticket expense summary from an IMAP mailbox")
        .after_help(
            "Routes are read from the environment (or .env): ROUTE_<n>_NAME, \
             ROUTE_<n>_KEYWORDS (comma separated) and ROUTE_<n>_PRICE, for n = 1, 2, ...",
        )
        .arg(Arg::with_name("username")
            .short("u")
            .long("user")
            .value_name("USERNAME")
            .env("EMAIL_USER")
            .required(true)
            .takes_value(true))
        .arg(Arg::with_name("password")
            .short("p")
            .long("pass")
            .value_name("PASSWORD")
            .env("EMAIL_PASS")
            .hide_env_values(true)
            .required(true)
            .takes_value(true))
        .arg(Arg::with_name("server")
            .short("s")
            .long("server")
            .value_name("HOST")
            .env("IMAP_SERVER")
            .required(true)
            .takes_value(true))
        .arg(Arg::with_name("port")
            .long("port")
            .value_name("PORT")
            .env("IMAP_PORT")
            .default_value("993")
            .takes_value(true))
        .arg(Arg::with_name("auth")
            .long("auth")
            .value_name("MECHANISM")
            .env("IMAP_AUTH")
            .possible_values(&["login", "plain"])
            .case_insensitive(true)
            .default_value("login")
            .takes_value(true))
        .arg(Arg::with_name("mailbox")
            .long("mailbox")
            .value_name("MAILBOX")
            .env("IMAP_MAILBOX")
            .default_value("INBOX")
            .takes_value(true))
        .arg(Arg::with_name("month")
            .short("m")
            .long("month")
            .value_name("MONTH")
            .env("SEARCH_MONTH")
            .required(true)
            .takes_value(true))
        .arg(Arg::with_name("year")
            .short("y")
            .long("year")
            .value_name("YEAR")
            .env("SEARCH_YEAR")
            .required(true)
            .takes_value(true))
        .arg(Arg::with_name("sender")
            .short("f")
            .long("from")
            .value_name("SENDER")
            .env("SENDER_EMAIL")
            .required(true)
            .takes_value(true))
        .arg(Arg::with_name("taxi_fare")
            .long("taxi-fare")
            .value_name("AMOUNT")
            .env("TAXI_FARE")
            .default_value("30")
            .takes_value(true))
        .arg(Arg::with_name("attachments_dir")
            .long("attachments-dir")
            .value_name("DIR")
            .env("ATTACHMENT_ROOT")
            .default_value("attachments")
            .takes_value(true))
        .arg(Arg::with_name("output_dir")
            .long("output-dir")
            .value_name("DIR")
            .env("OUTPUT_DIR")
            .default_value("data")
            .takes_value(true))
        .arg(Arg::with_name("dbname")
            .short("n")
            .long("dbname")
            .value_name("DATABASE NAME")
            .env("TICKETS_DB")
            .takes_value(true))
}

/// Loads `.env`, then reads the command line and the route table.
pub fn arg_parse() -> Result<AppConfig> {
    dotenv::dotenv().ok();
    let matches = app().get_matches();
    config_from_matches(&matches, |key| env::var(key).ok())
}

#[cfg(test)]
fn arg_parse_from<F>(args: &[&str], lookup: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let matches = app().get_matches_from_safe(args.iter().copied())?;
    config_from_matches(&matches, lookup)
}

fn config_from_matches<F>(matches: &ArgMatches, lookup: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let required = |name: &str| -> Result<String> {
        matches
            .value_of(name)
            .map(str::to_string)
            .ok_or_else(|| AppError::Config(format!("missing value for {}", name)))
    };

    let port = required("port")?
        .parse::<u16>()
        .map_err(|_| AppError::Config(format!("invalid port: {}", matches.value_of("port").unwrap_or(""))))?;
    let auth = AuthMechanism::parse(&required("auth")?)
        .ok_or_else(|| AppError::Config("auth must be 'login' or 'plain'".to_string()))?;
    let period = SearchPeriod::parse(&required("month")?, &required("year")?)?;
    let taxi_fare = required("taxi_fare")?
        .trim()
        .parse::<f64>()
        .map_err(|_| AppError::Config("TAXI_FARE is not a number".to_string()))?;

    Ok(AppConfig {
        server: required("server")?,
        port,
        username: required("username")?,
        password: required("password")?,
        auth,
        mailbox: required("mailbox")?,
        sender: required("sender")?,
        period,
        taxi_fare,
        routes: load_routes(lookup)?,
        attachments_root: PathBuf::from(required("attachments_dir")?),
        output_dir: PathBuf::from(required("output_dir")?),
        db_name: matches.value_of("dbname").map(str::to_string),
    })
}
