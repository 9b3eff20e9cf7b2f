// The domain of this Gateway controller.
pub const CONTROLLER_DOMAIN: &str = "caddyserver.com";

// Controller identity set on GatewayClasses we reconcile. Sub-paths of this
// prefix are accepted so major API changes stay backwards compatible.
pub const GATEWAY_CLASS_CONTROLLER_NAME: &str = "caddyserver.com/gateway-controller";

// Label used to indicate that a Service or Endpoints object carries the
// data plane for a Gateway.
pub const OWNING_GATEWAY_LABEL: &str = "gateway.caddyserver.com/owning-gateway";

// Field manager for status patches.
pub const FIELD_MANAGER: &str = "caddy-gateway-controller";

// API group of the Gateway API resources.
pub const GATEWAY_GROUP: &str = "gateway.networking.k8s.io";

// API group of the experimental Gateway API resources.
pub const GATEWAY_X_GROUP: &str = "gateway.networking.x-k8s.io";

// Address Caddy's own admin endpoint binds inside each data-plane pod.
pub const CADDY_ADMIN_LISTEN: &str = ":2019";

// Default port of the admin-API authorizer that fronts each Caddy replica.
pub const DEFAULT_DATAPLANE_ADMIN_PORT: u16 = 2021;

// Default locations of the client credentials for the admin-API channel.
pub const DEFAULT_TLS_CERTIFICATE_PATH: &str = "/var/run/secrets/tls/tls.crt";
pub const DEFAULT_TLS_PRIVATE_KEY_PATH: &str = "/var/run/secrets/tls/tls.key";
pub const DEFAULT_TLS_CA_PATH: &str = "/var/run/secrets/tls/ca.crt";

// CRD annotations describing the installed Gateway API bundle.
pub const BUNDLE_VERSION_ANNOTATION: &str = "gateway.networking.k8s.io/bundle-version";
pub const CHANNEL_ANNOTATION: &str = "gateway.networking.k8s.io/channel";

// Route condition types (Gateway API vocabulary).
pub const ROUTE_CONDITION_ACCEPTED: &str = "Accepted";
pub const ROUTE_CONDITION_RESOLVED_REFS: &str = "ResolvedRefs";

// Route condition reasons.
pub const ROUTE_REASON_ACCEPTED: &str = "Accepted";
pub const ROUTE_REASON_RESOLVED_REFS: &str = "ResolvedRefs";
pub const ROUTE_REASON_REF_NOT_PERMITTED: &str = "RefNotPermitted";
pub const ROUTE_REASON_INVALID_KIND: &str = "InvalidKind";
pub const ROUTE_REASON_BACKEND_NOT_FOUND: &str = "BackendNotFound";
pub const ROUTE_REASON_NOT_ALLOWED_BY_LISTENERS: &str = "NotAllowedByListeners";
pub const ROUTE_REASON_NO_MATCHING_LISTENER_HOSTNAME: &str = "NoMatchingListenerHostname";
pub const ROUTE_REASON_NO_MATCHING_PARENT: &str = "NoMatchingParent";

// GatewayClass SupportedVersion condition and reasons.
pub const GATEWAY_CLASS_CONDITION_SUPPORTED_VERSION: &str = "SupportedVersion";
pub const GATEWAY_CLASS_REASON_SUPPORTED_VERSION: &str = "SupportedVersion";
pub const GATEWAY_CLASS_REASON_UNSUPPORTED_VERSION: &str = "UnsupportedVersion";

// Backend appProtocol values recognized on Service ports.
pub const APP_PROTOCOL_H2C: &str = "kubernetes.io/h2c";
pub const APP_PROTOCOL_WS: &str = "kubernetes.io/ws";
