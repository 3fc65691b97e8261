use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::Deserialize;

pub const CURRENT_VERSION: u16 = 1;
pub const APPLICATION_CONFIG_FOLDER_NAME: &str = "kaloriz_chat";
pub const CONFIG_FILE_NAME: &str = "config.yaml";

const DEFAULT_ENDPOINT_URL: &str = "http://localhost:8000";
const DEFAULT_ENDPOINT_PATH: &str = "/chatbot/";
const DEFAULT_REQUEST_TIMEOUT_S: u64 = 15;
const DEFAULT_ASSISTANT_NAME: &str = "Asisten Kaloriz";
const DEFAULT_TYPING_TEXT: &str = "Asisten Kaloriz sedang mengetik…";

// the quick replies offered before the server recommends any of its own
pub const DEFAULT_QUICK_REPLIES: [&str; 7] = [
    "Lacak pesanan",
    "Hubungi admin",
    "Cek metode pembayaran",
    "Cara pemesanan",
    "Ongkir",
    "Produk",
    "Promo",
];

// How outgoing turns are encoded when posted to the conversation endpoint.
#[derive(Deserialize, PartialEq, Debug, Clone, Copy, Default)]
pub enum TransportEncoding {
    // `application/json` bodies, no CSRF header
    #[default]
    Json,

    // `application/x-www-form-urlencoded` bodies with the `X-CSRFToken` header
    Form,
}

// A single flash sale card shown on the storefront board.
#[derive(Deserialize, PartialEq, Debug, Clone, Default)]
pub struct ConfiguredFlashSale {
    // the product name shown on the card
    pub name: String,

    // optional display price, shown as-is
    pub price: Option<String>,

    // the sale end timestamp; RFC 3339 or a naive local `YYYY-MM-DDTHH:MM[:SS]`
    pub end_time: String,
}

#[derive(Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct ConfigurationFile {
    // version number for the file which should be incremented on breaking changes
    pub version: u16,

    // the scheme and host of the storefront serving the conversation endpoint
    pub endpoint_url: Option<String>,

    // the path of the conversation endpoint on the storefront; defaults to `/chatbot/`
    pub endpoint_path: Option<String>,

    // the number of seconds to wait on the endpoint before giving up on a request
    pub request_timeout_s: Option<u64>,

    // json or form encoded turns
    pub transport_encoding: Option<TransportEncoding>,

    // an optional `Cookie` header value to seed the cookie jar with, for example
    // an existing `sessionid` so order tracking works for a logged in customer.
    pub session_cookie: Option<String>,

    // the name shown for bot messages in the transcript
    pub assistant_name: Option<String>,

    // the label shown next to the typing indicator
    pub typing_text: Option<String>,

    // the quick replies offered when the server doesn't recommend any
    pub default_quick_replies: Option<Vec<String>>,

    // the display name used for the customer's own messages
    pub display_name: String,

    // the color to use for the display name of the customer in the transcript
    pub display_name_rgb: Option<[u8; 3]>,

    // the color to use for the customer's message text
    pub text_rgb: Option<[u8; 3]>,

    // the color to use for the assistant's name in the transcript
    pub assistant_name_rgb: Option<[u8; 3]>,

    // the color to use for the assistant's message text
    pub assistant_text_rgb: Option<[u8; 3]>,

    // optional setting to add a 'buffer' between transcript messages to aid in visually grouping them.
    pub add_visual_buffer_between_messages: Option<bool>,

    // the flash sale cards for the storefront board
    #[serde(default)]
    pub flash_sales: Vec<ConfiguredFlashSale>,
}

impl Default for ConfigurationFile {
    fn default() -> Self {
        return ConfigurationFile {
            version: CURRENT_VERSION,
            endpoint_url: None,
            endpoint_path: None,
            request_timeout_s: None,
            transport_encoding: None,
            session_cookie: None,
            assistant_name: None,
            typing_text: None,
            default_quick_replies: None,
            display_name: "Anda".to_owned(),
            display_name_rgb: None,
            text_rgb: None,
            assistant_name_rgb: None,
            assistant_text_rgb: None,
            add_visual_buffer_between_messages: None,
            flash_sales: Vec::new(),
        };
    }
}

impl ConfigurationFile {
    // loads the configuration file by using the alternative path specified or by searching
    // common locations for the config file to load.
    // if those fail to find a file, then a new configuration object is constructed with defaults and returned.
    pub fn load_config(alt_config_filepath: Option<&String>) -> ConfigurationFile {
        let filepath: Option<PathBuf> = locate_config_file(CONFIG_FILE_NAME, alt_config_filepath);

        // if we found a file, deserialize it as yaml
        if let Some(found_file) = filepath {
            match std::fs::read_to_string(&found_file) {
                Ok(plain_string) => match Self::from_yaml_str(plain_string.as_str()) {
                    Ok(cfg) => {
                        return cfg;
                    }
                    Err(err) => {
                        log::error!(
                            "Failed to deserialize the configuration file ({:?}): {}",
                            found_file,
                            err
                        );
                    }
                },
                Err(err) => log::error!(
                    "Failed to load the configuration file ({:?}): {}",
                    found_file,
                    err
                ),
            };
        }

        // if we made it here, no config file was found, or if it was found, it could not be deserialized as yaml.
        log::warn!(
            "Using a default configuration file from memory since none were located to be read."
        );
        return Default::default();
    }

    pub fn from_yaml_str(yaml: &str) -> Result<ConfigurationFile, serde_yaml::Error> {
        let cfg = serde_yaml::from_str::<ConfigurationFile>(yaml)?;
        if cfg.version != CURRENT_VERSION {
            log::warn!(
                "Configuration file version {} doesn't match the supported version {}",
                cfg.version,
                CURRENT_VERSION
            );
        }
        Ok(cfg)
    }

    // the full url of the conversation endpoint, joining the host and path
    // without doubling up the slash between them.
    pub fn conversation_url(&self) -> String {
        let host = self
            .endpoint_url
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT_URL)
            .trim_end_matches('/');
        let path = self
            .endpoint_path
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT_PATH)
            .trim_start_matches('/');
        format!("{}/{}", host, path)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.request_timeout_s.unwrap_or(DEFAULT_REQUEST_TIMEOUT_S),
        )
    }

    pub fn encoding(&self) -> TransportEncoding {
        self.transport_encoding.unwrap_or_default()
    }

    pub fn assistant_name(&self) -> &str {
        self.assistant_name
            .as_deref()
            .unwrap_or(DEFAULT_ASSISTANT_NAME)
    }

    pub fn typing_text(&self) -> &str {
        self.typing_text.as_deref().unwrap_or(DEFAULT_TYPING_TEXT)
    }

    // an empty configured list counts as not configured at all
    pub fn quick_reply_defaults(&self) -> Vec<String> {
        match &self.default_quick_replies {
            Some(labels) if !labels.is_empty() => labels.clone(),
            _ => DEFAULT_QUICK_REPLIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// loads a configuration file in the following order:
//  1) alternate path provided as parameter
//  2) 'platform' config folder (e.g. /home/alice/.config or C:\Users\Alice\AppData\Roaming or /Users/Alice/Library/Application Support)
//  3) next to the binary in the working folder
pub fn locate_config_file(filename: &str, alt_path: Option<&String>) -> Option<PathBuf> {
    let mut filepath: Option<PathBuf> = None;

    // specified alternate config file
    if let Some(alt) = alt_path {
        let p = Path::new(alt.as_str());
        if p.exists() {
            filepath = Some(p.to_path_buf());
        }
    }

    // try the 'platform' config file location
    if filepath.is_none() {
        if let Some(base_dirs) = BaseDirs::new() {
            let p = Path::new(&base_dirs.config_dir())
                .join(APPLICATION_CONFIG_FOLDER_NAME)
                .join(filename);
            if p.exists() {
                filepath = Some(p);
            }
        }
    }

    // last attempt, look parallel next to the executable
    if filepath.is_none() {
        let p = Path::new(filename);
        if p.exists() {
            filepath = Some(p.to_path_buf());
        }
    }

    filepath
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn minimal_yaml_uses_defaults() {
        let cfg = ConfigurationFile::from_yaml_str("version: 1\ndisplay_name: Budi\n").unwrap();
        assert_eq!(cfg.conversation_url(), "http://localhost:8000/chatbot/");
        assert_eq!(cfg.encoding(), TransportEncoding::Json);
        assert_eq!(cfg.request_timeout(), std::time::Duration::from_secs(15));
        assert_eq!(cfg.typing_text(), "Asisten Kaloriz sedang mengetik…");
        assert_eq!(cfg.quick_reply_defaults().len(), 7);
        assert!(cfg.flash_sales.is_empty());
    }

    #[test]
    fn conversation_url_joins_without_double_slashes() {
        let cfg = ConfigurationFile {
            endpoint_url: Some("https://kaloriz.example/".to_owned()),
            endpoint_path: Some("/ai/chat/".to_owned()),
            ..Default::default()
        };
        assert_eq!(cfg.conversation_url(), "https://kaloriz.example/ai/chat/");
    }

    #[test]
    fn parses_flash_sales_and_form_encoding() {
        let yaml = r#"
version: 1
display_name: Budi
transport_encoding: Form
default_quick_replies: []
flash_sales:
  - name: Granola Bar
    price: Rp15.000
    end_time: "2026-10-16T20:00:00+07:00"
"#;
        let cfg = ConfigurationFile::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.encoding(), TransportEncoding::Form);
        assert_eq!(cfg.quick_reply_defaults()[0], "Lacak pesanan");
        assert_eq!(
            cfg.flash_sales,
            vec![ConfiguredFlashSale {
                name: "Granola Bar".to_owned(),
                price: Some("Rp15.000".to_owned()),
                end_time: "2026-10-16T20:00:00+07:00".to_owned(),
            }]
        );
    }
}
