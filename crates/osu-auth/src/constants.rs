//! osu! API endpoints and OAuth parameters
//!
//! Defaults only. Both URLs can be overridden from configuration, which is
//! how tests point the service at a local mock.

/// Token endpoint for the client-credentials exchange
pub const TOKEN_ENDPOINT: &str = "https://osu.ppy.sh/oauth/token";

/// Base URL of the v2 API (profile lookups live under `/users`)
pub const API_BASE: &str = "https://osu.ppy.sh/api/v2";

/// Scope requested for application tokens. `public` is the only scope
/// available to the client-credentials grant.
pub const DEFAULT_SCOPE: &str = "public";

pub const GRANT_TYPE: &str = "client_credentials";
