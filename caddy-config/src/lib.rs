/*
Copyright 2024 The Kubernetes Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Typed mirror of the Caddy JSON configuration format.
//!
//! Only the subset the gateway controller emits is modeled, but field names
//! and nesting match Caddy's admin API exactly so the serialized document can
//! be POSTed to `/load` verbatim. Polymorphic values (handlers, matchers, CA
//! pool providers) carry their Caddy module discriminator in the serialized
//! object, e.g. `"handler": "reverse_proxy"`.

pub mod duration;
pub mod http;
pub mod layer4;
pub mod tls;

pub use duration::{parse_duration, Duration};

use serde::{Deserialize, Serialize};

// Config is the top-level configuration for a Caddy server.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<AdminConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apps: Option<Apps>,
}

// Apps is the configuration for "apps" on a Caddy server.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Apps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<http::App>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<tls::Tls>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer4: Option<layer4::App>,
}

// AdminConfig configures Caddy's API endpoint, which is used to manage Caddy
// while it is running.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminConfig {
    // If true, the admin endpoint will be completely disabled.
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,

    // The address to which the admin endpoint's listener should bind itself.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub listen: String,

    // If true, CORS headers will be emitted, and requests to the API will be
    // rejected if their `Host` and `Origin` headers do not match the
    // expected value(s).
    #[serde(default, skip_serializing_if = "is_false")]
    pub enforce_origin: bool,

    // The list of allowed origins/hosts for API requests.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub origins: Vec<String>,
}

pub(crate) fn is_false(v: &bool) -> bool {
    !*v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_serializes_to_empty_object() {
        let config = Config::default();
        assert_eq!(serde_json::to_string(&config).unwrap(), "{}");
    }

    #[test]
    fn admin_listen_round_trips() {
        let config = Config {
            admin: Some(AdminConfig {
                listen: ":2019".into(),
                ..Default::default()
            }),
            apps: None,
        };
        let raw = serde_json::to_string(&config).unwrap();
        assert_eq!(raw, r#"{"admin":{"listen":":2019"}}"#);
        let parsed: Config = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, config);
    }
}
