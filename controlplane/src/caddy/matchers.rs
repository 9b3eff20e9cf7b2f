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

//! Builders for Caddy request matchers from HTTPRoute match terms.

use caddy_config::http::{Match, MatchRegexp};
use gateway_api::apis::standard::httproutes::{
    HTTPRouteRulesMatchesHeaders, HTTPRouteRulesMatchesHeadersType, HTTPRouteRulesMatchesMethod,
    HTTPRouteRulesMatchesPath, HTTPRouteRulesMatchesPathType, HTTPRouteRulesMatchesQueryParams,
    HTTPRouteRulesMatchesQueryParamsType,
};

// ref; https://caddyserver.com/docs/json/apps/http/servers/routes/match/path/
pub(super) fn path_matcher(matcher: &mut Match, path: &HTTPRouteRulesMatchesPath) {
    let Some(value) = path.value.as_deref() else {
        return;
    };
    if value.is_empty() {
        return;
    }
    let match_type = path
        .r#type
        .clone()
        .unwrap_or(HTTPRouteRulesMatchesPathType::PathPrefix);

    // A PathPrefix of `/` is just a verbose way of saying "match all
    // paths"; emit no matcher for it.
    if value == "/" && matches!(match_type, HTTPRouteRulesMatchesPathType::PathPrefix) {
        return;
    }

    match match_type {
        HTTPRouteRulesMatchesPathType::Exact => {
            matcher.path = vec![value.to_string()];
        }
        HTTPRouteRulesMatchesPathType::PathPrefix => {
            matcher.path = vec![format!("{value}*")];
        }
        HTTPRouteRulesMatchesPathType::RegularExpression => {
            matcher.path_re = Some(MatchRegexp {
                pattern: value.to_string(),
                ..Default::default()
            });
        }
    }
}

// ref; https://caddyserver.com/docs/json/apps/http/servers/routes/match/method/
pub(super) fn method_matcher(matcher: &mut Match, method: &HTTPRouteRulesMatchesMethod) {
    matcher.method = vec![method_name(method).to_string()];
}

fn method_name(method: &HTTPRouteRulesMatchesMethod) -> &'static str {
    match method {
        HTTPRouteRulesMatchesMethod::Get => "GET",
        HTTPRouteRulesMatchesMethod::Head => "HEAD",
        HTTPRouteRulesMatchesMethod::Post => "POST",
        HTTPRouteRulesMatchesMethod::Put => "PUT",
        HTTPRouteRulesMatchesMethod::Delete => "DELETE",
        HTTPRouteRulesMatchesMethod::Connect => "CONNECT",
        HTTPRouteRulesMatchesMethod::Options => "OPTIONS",
        HTTPRouteRulesMatchesMethod::Trace => "TRACE",
        HTTPRouteRulesMatchesMethod::Patch => "PATCH",
    }
}

// ref; https://caddyserver.com/docs/json/apps/http/servers/routes/match/header/
pub(super) fn header_matcher(matcher: &mut Match, headers: &[HTTPRouteRulesMatchesHeaders]) {
    for header in headers {
        match header.r#type {
            None | Some(HTTPRouteRulesMatchesHeadersType::Exact) => {
                matcher
                    .header
                    .entry(header.name.clone())
                    .or_default()
                    .push(header.value.clone());
            }
            Some(HTTPRouteRulesMatchesHeadersType::RegularExpression) => {
                matcher.header_regexp.insert(
                    header.name.clone(),
                    MatchRegexp {
                        pattern: header.value.clone(),
                        ..Default::default()
                    },
                );
            }
        }
    }
}

// ref; https://caddyserver.com/docs/json/apps/http/servers/routes/match/query/
//
// Caddy has no query_regexp matcher, so RegularExpression matches are
// expressed through vars_regexp on the query placeholder.
pub(super) fn query_matcher(matcher: &mut Match, params: &[HTTPRouteRulesMatchesQueryParams]) {
    for param in params {
        match param.r#type {
            None | Some(HTTPRouteRulesMatchesQueryParamsType::Exact) => {
                matcher
                    .query
                    .entry(param.name.clone())
                    .or_default()
                    .push(param.value.clone());
            }
            Some(HTTPRouteRulesMatchesQueryParamsType::RegularExpression) => {
                matcher.vars_regexp.insert(
                    format!("{{http.request.uri.query.{}}}", param.name),
                    MatchRegexp {
                        pattern: param.value.clone(),
                        ..Default::default()
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(value: &str, match_type: Option<HTTPRouteRulesMatchesPathType>) -> HTTPRouteRulesMatchesPath {
        HTTPRouteRulesMatchesPath {
            r#type: match_type,
            value: Some(value.to_string()),
        }
    }

    #[test]
    fn path_prefix_appends_wildcard() {
        let mut matcher = Match::default();
        path_matcher(&mut matcher, &path("/foo", Some(HTTPRouteRulesMatchesPathType::PathPrefix)));
        assert_eq!(matcher.path, vec!["/foo*"]);
    }

    #[test]
    fn root_path_prefix_emits_no_matcher() {
        let mut matcher = Match::default();
        path_matcher(&mut matcher, &path("/", Some(HTTPRouteRulesMatchesPathType::PathPrefix)));
        assert!(matcher.is_empty());
    }

    #[test]
    fn exact_path_is_literal() {
        let mut matcher = Match::default();
        path_matcher(&mut matcher, &path("/foo", Some(HTTPRouteRulesMatchesPathType::Exact)));
        assert_eq!(matcher.path, vec!["/foo"]);
    }

    #[test]
    fn regular_expression_path_uses_path_regexp() {
        let mut matcher = Match::default();
        path_matcher(
            &mut matcher,
            &path("^/api/v[0-9]+", Some(HTTPRouteRulesMatchesPathType::RegularExpression)),
        );
        assert!(matcher.path.is_empty());
        assert_eq!(
            matcher.path_re.as_ref().map(|re| re.pattern.as_str()),
            Some("^/api/v[0-9]+"),
        );
    }

    #[test]
    fn default_path_type_is_prefix() {
        let mut matcher = Match::default();
        path_matcher(&mut matcher, &path("/api", None));
        assert_eq!(matcher.path, vec!["/api*"]);
    }

    #[test]
    fn method_is_uppercased_literal() {
        let mut matcher = Match::default();
        method_matcher(&mut matcher, &HTTPRouteRulesMatchesMethod::Get);
        assert_eq!(matcher.method, vec!["GET"]);
    }

    #[test]
    fn header_matches_split_by_type() {
        let mut matcher = Match::default();
        header_matcher(
            &mut matcher,
            &[
                HTTPRouteRulesMatchesHeaders {
                    name: "X-Tenant".to_string(),
                    r#type: Some(HTTPRouteRulesMatchesHeadersType::Exact),
                    value: "acme".to_string(),
                },
                HTTPRouteRulesMatchesHeaders {
                    name: "X-Version".to_string(),
                    r#type: Some(HTTPRouteRulesMatchesHeadersType::RegularExpression),
                    value: "^v[0-9]+$".to_string(),
                },
            ],
        );
        assert_eq!(matcher.header.get("X-Tenant"), Some(&vec!["acme".to_string()]));
        assert_eq!(
            matcher.header_regexp.get("X-Version").map(|re| re.pattern.as_str()),
            Some("^v[0-9]+$"),
        );
    }
}
