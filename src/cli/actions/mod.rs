pub mod server;

use secrecy::SecretString;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        store_url: String,
        secret_key: SecretString,
        access_ttl: u64,
        refresh_ttl: u64,
    },
}
