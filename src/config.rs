/// Casket configuration
#[derive(Serialize, Deserialize, Clone)]
pub struct Config {
    /// Length of the random portion of issued ticket strings
    pub ticket_rand_length: usize,

    /// Service and proxy ticket lifetime in seconds
    ///
    /// The CAS protocol expects these tickets to be validated
    /// promptly after issuance, so keep this short.
    pub ticket_expiry_seconds: i64,

    /// Proxy-granting ticket lifetime in seconds
    ///
    /// Proxy-granting tickets live as long as the single sign-on
    /// session that produced them.
    pub proxy_granting_ticket_expiry_seconds: i64,

    /// Timeout for the proxy callback round trip in seconds
    pub callback_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            ticket_rand_length: 32,
            ticket_expiry_seconds: 5 * 60,
            proxy_granting_ticket_expiry_seconds: 14 * 24 * 60 * 60,
            callback_timeout_seconds: 10,
        }
    }
}
