//! IGDB endpoint constants
//!
//! Public endpoint configuration for the IGDB metadata API and its Twitch
//! OAuth token service. These values are not secrets; the actual secrets
//! (client id and client secret) are supplied through the environment.

/// Token endpoint for the client-credentials exchange (Twitch identity service)
pub const TOKEN_ENDPOINT: &str = "https://id.twitch.tv/oauth2/token";

/// Base URL of the IGDB v4 query API
pub const API_BASE_URL: &str = "https://api.igdb.com/v4";

/// OAuth grant type used for app-to-app authentication
pub const GRANT_TYPE: &str = "client_credentials";
