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

//! The `tls` Caddy app: certificates and connection policies.

use serde::{Deserialize, Serialize};

use crate::is_false;

// Tls provides TLS facilities including certificate loading and connection
// policies.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tls {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificates: Option<Certificates>,

    // Disables OCSP stapling for manually-managed certificates.
    #[serde(default, skip_serializing_if = "is_false")]
    pub disable_ocsp_stapling: bool,
}

// Certificates configures how to load certificates into the cache.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificates {
    // Subjects for which to automate certificate management.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub automate: Vec<String>,

    // Certificate and key pairs to load directly, as PEM text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_pem: Vec<CertKeyPemPair>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertKeyPemPair {
    // The certificate (public key) in PEM format.
    #[serde(rename = "certificate")]
    pub certificate_pem: String,

    // The private key in PEM format.
    #[serde(rename = "key")]
    pub key_pem: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

// ConnectionPolicy dictates how to establish a TLS connection for requests
// that match its matchers.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPolicy {
    #[serde(
        rename = "match",
        skip_serializing_if = "Option::is_none"
    )]
    pub matchers: Option<ConnectionMatchers>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cipher_suites: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub curves: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol_min: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol_max: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_authentication: Option<ClientAuthentication>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_sni: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fallback_sni: String,
}

// ConnectionMatchers qualify a connection policy, keyed by matcher module.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMatchers {
    // Matches on the server name indicated in the TLS ClientHello.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sni: Vec<String>,
}

// ClientAuthentication configures TLS client certificate verification.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientAuthentication {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trusted_ca_certs: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trusted_ca_certs_pem_files: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trusted_leaf_certs: Vec<String>,

    // The verification mode, e.g. `require_and_verify`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,
}

// CaPool is a source of trusted root certificates, tagged with the Caddy
// provider module name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum CaPool {
    // Trusted root certificates provided inline, base64 DER-encoded.
    Inline {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        trusted_ca_certs: Vec<String>,
    },
    // Trusted root certificates loaded from PEM files.
    File {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pem_files: Vec<String>,
    },
    PkiRoot {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        authority: Vec<String>,
    },
    PkiIntermediate {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        authority: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ca_pool_is_tagged_with_provider() {
        let pool = CaPool::Inline {
            trusted_ca_certs: vec!["MIIB...".into()],
        };
        assert_eq!(
            serde_json::to_string(&pool).unwrap(),
            r#"{"provider":"inline","trusted_ca_certs":["MIIB..."]}"#,
        );
    }

    #[test]
    fn connection_policy_sni_matcher() {
        let policy = ConnectionPolicy {
            matchers: Some(ConnectionMatchers {
                sni: vec!["api.example.com".into()],
            }),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&policy).unwrap(),
            r#"{"match":{"sni":["api.example.com"]}}"#,
        );
    }

    #[test]
    fn load_pem_uses_short_field_names() {
        let certs = Certificates {
            load_pem: vec![CertKeyPemPair {
                certificate_pem: "CERT".into(),
                key_pem: "KEY".into(),
                tags: vec![],
            }],
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&certs).unwrap(),
            r#"{"load_pem":[{"certificate":"CERT","key":"KEY"}]}"#,
        );
    }
}
