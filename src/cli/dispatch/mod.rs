use crate::cli::actions::Action;
use anyhow::Result;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches.get_one("dsn").map(|s: &String| s.to_string()),
        frontend_url: matches
            .get_one("frontend-url")
            .map_or_else(|| "http://localhost:3000".to_string(), |s: &String| s.to_string()),
        reset_ttl: matches.get_one::<i64>("reset-ttl").copied().unwrap_or(3600),
        session_ttl: matches
            .get_one::<i64>("session-ttl")
            .copied()
            .unwrap_or(43200),
    })
}
