//! Session configuration: proxy identity, cookie set, verification target.
//!
//! Field names follow the remote config's JSON shape (camelCase), so a config
//! produced for the original deployment deserializes unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub mod provider;

pub use provider::{ConfigProvider, FileConfigProvider, HttpConfigProvider};

/// Immutable session configuration supplied by a [`ConfigProvider`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
	pub proxy_config: ProxyConfig,
	#[serde(default)]
	pub cookies: Vec<CookieRecord>,
	/// Endpoint queried from page context to observe the egress address.
	pub ip_checker_url: String,
	/// Application the primary page navigates to after the gate opens.
	#[serde(default = "default_target_url")]
	pub target_url: String,
}

/// Proxy egress identity and optional credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
	/// Address passed to `--proxy-server`.
	pub server: String,
	#[serde(default)]
	pub username: Option<String>,
	#[serde(default)]
	pub password: Option<String>,
	/// Address the IP checker must report before any traffic is released.
	#[serde(rename = "ip")]
	pub expected_ip: String,
}

/// One cookie to restore through the control protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
	pub name: String,
	pub value: String,
	pub domain: String,
	#[serde(default = "default_cookie_path")]
	pub path: String,
	/// Unix timestamp; session cookie when absent.
	#[serde(default)]
	pub expiration_date: Option<f64>,
	#[serde(default)]
	pub http_only: bool,
	#[serde(default)]
	pub secure: bool,
	#[serde(default)]
	pub same_site: SameSitePolicy,
}

/// SameSite attribute; a source value of `unspecified` maps to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SameSitePolicy {
	#[serde(alias = "strict")]
	Strict,
	#[serde(alias = "lax")]
	Lax,
	#[default]
	#[serde(alias = "unspecified", alias = "no_restriction", alias = "none")]
	None,
}

impl SameSitePolicy {
	pub fn as_cdp(self) -> &'static str {
		match self {
			SameSitePolicy::Strict => "Strict",
			SameSitePolicy::Lax => "Lax",
			SameSitePolicy::None => "None",
		}
	}
}

impl CookieRecord {
	/// Builds the `Network.setCookie` payload for this record.
	pub fn to_cdp_params(&self) -> Value {
		let mut params = json!({
			"name": self.name,
			"value": self.value,
			"domain": self.domain,
			"path": self.path,
			"httpOnly": self.http_only,
			"secure": self.secure,
			"sameSite": self.same_site.as_cdp(),
		});
		if let Some(expires) = self.expiration_date {
			params["expires"] = json!(expires);
		}
		params
	}
}

fn default_cookie_path() -> String {
	"/".to_string()
}

fn default_target_url() -> String {
	"https://chatgpt.com/".to_string()
}
