use serde::{Deserialize, Serialize};

/// Site-wide settings, a singleton stored under the `site-config` id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteConfig {
    pub site_name: String,
    pub paypal_client_id: String,
    pub paypal_me_username: String,
    pub stripe_publishable_key: String,
    pub stripe_secret_key: String,
    pub telegram_username: String,
    pub video_list_title: String,
    /// Crypto wallet addresses shown at checkout
    pub crypto: Vec<String>,
    pub email_host: String,
    pub email_port: String,
    pub email_secure: bool,
    pub email_user: String,
    pub email_pass: String,
    pub email_from: String,
    pub wasabi_config: StorageCredentials,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site_name: "VideosPlus".to_string(),
            paypal_client_id: String::new(),
            paypal_me_username: String::new(),
            stripe_publishable_key: String::new(),
            stripe_secret_key: String::new(),
            telegram_username: String::new(),
            video_list_title: "Available Videos".to_string(),
            crypto: Vec::new(),
            email_host: "smtp.gmail.com".to_string(),
            email_port: "587".to_string(),
            email_secure: false,
            email_user: String::new(),
            email_pass: String::new(),
            email_from: String::new(),
            wasabi_config: StorageCredentials::default(),
        }
    }
}

/// Object storage credential block carried inside the site config
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl StorageCredentials {
    pub fn is_complete(&self) -> bool {
        self.access_key.as_deref().is_some_and(|k| !k.is_empty())
            && self.secret_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Partial site config update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfigPatch {
    pub site_name: Option<String>,
    pub paypal_client_id: Option<String>,
    pub paypal_me_username: Option<String>,
    pub stripe_publishable_key: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub telegram_username: Option<String>,
    pub video_list_title: Option<String>,
    pub crypto: Option<Vec<String>>,
    pub email_host: Option<String>,
    pub email_port: Option<String>,
    pub email_secure: Option<bool>,
    pub email_user: Option<String>,
    pub email_pass: Option<String>,
    pub email_from: Option<String>,
    pub wasabi_config: Option<StorageCredentials>,
}

macro_rules! merge_fields {
    ($patch:ident, $config:ident, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $patch.$field {
                $config.$field = value;
            }
        )+
    };
}

impl SiteConfigPatch {
    pub fn apply(self, config: &mut SiteConfig) {
        let patch = self;
        merge_fields!(
            patch,
            config,
            site_name,
            paypal_client_id,
            paypal_me_username,
            stripe_publishable_key,
            stripe_secret_key,
            telegram_username,
            video_list_title,
            crypto,
            email_host,
            email_port,
            email_secure,
            email_user,
            email_pass,
            email_from,
            wasabi_config,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: SiteConfig =
            serde_json::from_str(r#"{"siteName":"Shop","crypto":["btc:abc"]}"#).unwrap();

        assert_eq!(config.site_name, "Shop");
        assert_eq!(config.crypto, vec!["btc:abc".to_string()]);
        assert_eq!(config.email_port, "587");
        assert_eq!(config.wasabi_config, StorageCredentials::default());
    }

    #[test]
    fn test_patch_merge() {
        let mut config = SiteConfig::default();
        SiteConfigPatch {
            telegram_username: Some("shopadmin".into()),
            email_secure: Some(true),
            ..Default::default()
        }
        .apply(&mut config);

        assert_eq!(config.telegram_username, "shopadmin");
        assert!(config.email_secure);
        assert_eq!(config.site_name, "VideosPlus");
    }

    #[test]
    fn test_credentials_completeness() {
        let mut creds = StorageCredentials::default();
        assert!(!creds.is_complete());

        creds.access_key = Some("AK".into());
        creds.secret_key = Some("SK".into());
        assert!(creds.is_complete());
    }
}
