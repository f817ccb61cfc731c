use chrono::Utc;
use regex::Regex;

static ALPHABET: [char; 62] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I',
    'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'a', 'b',
    'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u',
    'v', 'w', 'x', 'y', 'z',
];

/// Generate a sufficiently opaque ticket string to ensure the ticket
/// is not guessable, prepending the given prefix
pub fn create_ticket_string(prefix: &str, rand_len: usize) -> String {
    format!(
        "{}-{}-{}",
        prefix,
        Utc::now().timestamp(),
        nanoid!(rand_len, &ALPHABET)
    )
}

/// Check a ticket string against the wire grammar
///
/// Tickets look like `PREFIX-EPOCHSECONDS-RANDOM`. Strings which do
/// not match must be rejected before any store lookup is attempted.
pub fn matches_ticket_grammar(ticket: &str, rand_len: usize) -> bool {
    lazy_static! {
        static ref TICKET_RE: Regex = Regex::new("^[A-Z]{2,3}-[0-9]{10,}-([A-Za-z0-9]+)$").unwrap();
    }

    TICKET_RE
        .captures(ticket)
        .map(|captures| captures[1].len() == rand_len)
        .unwrap_or_default()
}

/// Compare the origins (scheme, host and effective port) of two URLs
///
/// Paths are ignored. URLs which fail to parse never match.
pub fn same_origin(a: &str, b: &str) -> bool {
    match (reqwest::Url::parse(a), reqwest::Url::parse(b)) {
        (Ok(a), Ok(b)) => {
            a.scheme() == b.scheme()
                && a.host_str() == b.host_str()
                && a.port_or_known_default() == b.port_or_known_default()
        }
        _ => false,
    }
}
