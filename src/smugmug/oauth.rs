//! OAuth 1.0a request signing (HMAC-SHA1) for the SmugMug API.
//!
//! Only the signing half of OAuth is implemented: the access token and
//! secret are obtained out of band and handed in with the API key/secret.

use std::sync::atomic::{AtomicU64, Ordering};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use sha1::Sha1;
use url::Url;

/// RFC 3986 unreserved characters are the only ones left unescaped.
/// `! ' ( ) *` are escaped as well, unlike JavaScript's `encodeURIComponent`.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";

/// API key/secret plus the user's access token/secret.
#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Credentials {
    #[serde(alias = "api_key")]
    pub api_key: String,
    #[serde(alias = "api_secret")]
    pub api_secret: String,
    #[serde(alias = "user_token")]
    pub user_token: String,
    #[serde(alias = "user_secret")]
    pub user_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("user_token", &"<redacted>")
            .field("user_secret", &"<redacted>")
            .finish()
    }
}

/// Monotonic nonce source, seeded from a random 64-bit value.
///
/// Every call to [`NonceCounter::next`] atomically advances the counter, so
/// concurrent signers sharing one counter never hand out the same nonce.
#[derive(Debug)]
pub struct NonceCounter(AtomicU64);

impl NonceCounter {
    pub fn new() -> Self {
        Self::starting_at(rand::random())
    }

    pub fn starting_at(seed: u64) -> Self {
        Self(AtomicU64::new(seed))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }
}

impl Default for NonceCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Produces `Authorization: OAuth ...` header values for GET requests.
#[derive(Debug, Default)]
pub struct RequestSigner {
    nonce: NonceCounter,
}

impl RequestSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign a GET request for `url`. The URL must already be validated.
    pub fn sign(&self, url: &Url, credentials: &Credentials) -> String {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let nonce = format!("{:x}", self.nonce.next());
        authorization_header(url, credentials, &timestamp, &nonce)
    }
}

/// Build the header value for a fixed timestamp and nonce.
pub(crate) fn authorization_header(
    url: &Url,
    credentials: &Credentials,
    timestamp: &str,
    nonce: &str,
) -> String {
    let oauth_params = [
        ("oauth_consumer_key", credentials.api_key.as_str()),
        ("oauth_signature_method", SIGNATURE_METHOD),
        ("oauth_version", OAUTH_VERSION),
        ("oauth_token", credentials.user_token.as_str()),
        ("oauth_timestamp", timestamp),
        ("oauth_nonce", nonce),
    ];

    let base_string = signature_base_string("GET", url, &oauth_params);
    let signature = hmac_sha1_signature(
        &credentials.api_secret,
        &credentials.user_secret,
        &base_string,
    );

    format!(
        "OAuth oauth_consumer_key=\"{}\", oauth_signature_method=\"{}\", oauth_signature=\"{}\", \
         oauth_version=\"{}\", oauth_token=\"{}\", oauth_timestamp=\"{}\", oauth_nonce=\"{}\"",
        encode(&credentials.api_key),
        encode(SIGNATURE_METHOD),
        encode(&signature),
        encode(OAUTH_VERSION),
        encode(&credentials.user_token),
        encode(timestamp),
        encode(nonce),
    )
}

pub(crate) fn encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// `METHOD&encode(base_url)&encode(sorted_params)`.
///
/// The URL's query parameters are signed together with the OAuth
/// parameters. `Url::port` already reports `None` for a scheme's default
/// port, so `:80`/`:443` never reach the base string.
pub(crate) fn signature_base_string(method: &str, url: &Url, oauth_params: &[(&str, &str)]) -> String {
    let mut base_url = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        base_url.push(':');
        base_url.push_str(&port.to_string());
    }
    base_url.push_str(url.path());

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (encode(&k), encode(&v)))
        .chain(oauth_params.iter().map(|(k, v)| (encode(k), encode(v))))
        .collect();
    params.sort();

    let param_string = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        encode(&method.to_ascii_uppercase()),
        encode(&base_url),
        encode(&param_string)
    )
}

fn hmac_sha1_signature(consumer_secret: &str, token_secret: &str, base_string: &str) -> String {
    let key = format!("{}&{}", encode(consumer_secret), encode(token_secret));
    let mut mac =
        Hmac::<Sha1>::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(base_string.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn oauth_example_credentials() -> Credentials {
        Credentials {
            api_key: "dpf43f3p2l4k3l03".into(),
            api_secret: "kd94hf93k423kf44".into(),
            user_token: "nnch734d00sl2jdk".into(),
            user_secret: "pfkkdhi9sl3r4s00".into(),
        }
    }

    fn example_params<'a>(timestamp: &'a str, nonce: &'a str) -> [(&'a str, &'a str); 6] {
        [
            ("oauth_consumer_key", "dpf43f3p2l4k3l03"),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_version", "1.0"),
            ("oauth_token", "nnch734d00sl2jdk"),
            ("oauth_timestamp", timestamp),
            ("oauth_nonce", nonce),
        ]
    }

    #[test]
    fn test_encode_escapes_reserved_characters() {
        assert_eq!(encode("a b"), "a%20b");
        assert_eq!(encode("!'()*"), "%21%27%28%29%2A");
        assert_eq!(encode("-._~"), "-._~");
        assert_eq!(encode("a/b=c&d"), "a%2Fb%3Dc%26d");
        assert_eq!(encode("é"), "%C3%A9");
    }

    #[test]
    fn test_base_string_matches_oauth_core_example() {
        let url = Url::parse("http://photos.example.net/photos?file=vacation.jpg&size=original")
            .unwrap();
        let base = signature_base_string("GET", &url, &example_params("1191242096", "kllo9940pd9333jh"));
        assert_eq!(
            base,
            "GET&http%3A%2F%2Fphotos.example.net%2Fphotos&file%3Dvacation.jpg\
             %26oauth_consumer_key%3Ddpf43f3p2l4k3l03%26oauth_nonce%3Dkllo9940pd9333jh\
             %26oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1191242096\
             %26oauth_token%3Dnnch734d00sl2jdk%26oauth_version%3D1.0%26size%3Doriginal"
        );
    }

    #[test]
    fn test_signature_matches_oauth_core_example() {
        let url = Url::parse("http://photos.example.net/photos?file=vacation.jpg&size=original")
            .unwrap();
        let base = signature_base_string("GET", &url, &example_params("1191242096", "kllo9940pd9333jh"));
        let creds = oauth_example_credentials();
        let signature = hmac_sha1_signature(&creds.api_secret, &creds.user_secret, &base);
        assert_eq!(signature, "tR3+Ty81lMeYAr/Fid0kMTYa/WM=");
    }

    #[test]
    fn test_header_lists_encoded_signature() {
        let url = Url::parse("http://photos.example.net/photos?file=vacation.jpg&size=original")
            .unwrap();
        let header = authorization_header(
            &url,
            &oauth_example_credentials(),
            "1191242096",
            "kllo9940pd9333jh",
        );
        assert!(header.starts_with("OAuth oauth_consumer_key=\"dpf43f3p2l4k3l03\", "));
        assert!(header.contains("oauth_signature=\"tR3%2BTy81lMeYAr%2FFid0kMTYa%2FWM%3D\""));
        assert!(header.contains("oauth_signature_method=\"HMAC-SHA1\""));
        assert!(header.contains("oauth_version=\"1.0\""));
        assert!(header.contains("oauth_token=\"nnch734d00sl2jdk\""));
        assert!(header.contains("oauth_timestamp=\"1191242096\""));
        assert!(header.ends_with("oauth_nonce=\"kllo9940pd9333jh\""));
    }

    #[test]
    fn test_default_port_is_stripped() {
        let params = example_params("1", "2");
        for (with_port, without_port) in [
            ("http://api.example.com:80/api/v2!authuser", "http://api.example.com/api/v2!authuser"),
            ("https://api.example.com:443/api/v2?a=1", "https://api.example.com/api/v2?a=1"),
        ] {
            let a = signature_base_string("GET", &Url::parse(with_port).unwrap(), &params);
            let b = signature_base_string("GET", &Url::parse(without_port).unwrap(), &params);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_non_default_port_is_kept() {
        let url = Url::parse("https://api.example.com:8443/x").unwrap();
        let base = signature_base_string("GET", &url, &[]);
        assert!(base.starts_with("GET&https%3A%2F%2Fapi.example.com%3A8443%2Fx&"));
    }

    #[test]
    fn test_host_is_lowercased() {
        let url = Url::parse("https://API.Example.COM/x").unwrap();
        let base = signature_base_string("GET", &url, &[]);
        assert!(base.contains("api.example.com"));
    }

    #[test]
    fn test_params_sorted_by_key_then_value() {
        let url = Url::parse("https://api.example.com/x?b=2&a=z&a=b&a=a%20b").unwrap();
        let base = signature_base_string("GET", &url, &[("c", "1")]);
        let params = base.rsplit('&').next().unwrap();
        // ties on "a" are ordered by encoded value: "a%20b" < "b" < "z"
        assert_eq!(params, "a%3Da%2520b%26a%3Db%26a%3Dz%26b%3D2%26c%3D1");
    }

    #[test]
    fn test_empty_token_secret_is_allowed() {
        let sig = hmac_sha1_signature("secret", "", "GET&x&y");
        assert!(!sig.is_empty());
        assert_ne!(sig, hmac_sha1_signature("secret", "other", "GET&x&y"));
    }

    #[test]
    fn test_nonce_counter_increments() {
        let counter = NonceCounter::starting_at(41);
        assert_eq!(counter.next(), 42);
        assert_eq!(counter.next(), 43);
    }

    #[test]
    fn test_nonce_counter_wraps() {
        let counter = NonceCounter::starting_at(u64::MAX);
        assert_eq!(counter.next(), 0);
    }

    #[test]
    fn test_signing_twice_never_reuses_nonce() {
        let signer = RequestSigner::new();
        let url = Url::parse("https://api.smugmug.com/api/v2!authuser").unwrap();
        let creds = oauth_example_credentials();
        let nonce_of = |header: &str| {
            header
                .split("oauth_nonce=\"")
                .nth(1)
                .unwrap()
                .trim_end_matches('"')
                .to_string()
        };
        let a = nonce_of(&signer.sign(&url, &creds));
        let b = nonce_of(&signer.sign(&url, &creds));
        assert_ne!(a, b);
    }

    #[test]
    fn test_concurrent_nonces_are_unique() {
        let counter = Arc::new(NonceCounter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || (0..500).map(|_| counter.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for nonce in handle.join().unwrap() {
                assert!(seen.insert(nonce), "nonce {nonce} issued twice");
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let dbg = format!("{:?}", oauth_example_credentials());
        assert!(!dbg.contains("kd94hf93k423kf44"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn test_credentials_deserialize_camel_case() {
        let creds: Credentials = serde_json::from_str(
            r#"{"apiKey":"k","apiSecret":"s","userToken":"t","userSecret":"u"}"#,
        )
        .unwrap();
        assert_eq!(creds.api_key, "k");
        assert_eq!(creds.user_secret, "u");
    }
}
