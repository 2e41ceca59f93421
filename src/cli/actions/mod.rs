pub mod server;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: Option<String>,
        frontend_url: String,
        reset_ttl: i64,
        session_ttl: i64,
    },
}
