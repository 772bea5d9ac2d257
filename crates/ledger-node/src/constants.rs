pub(crate) const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
/// Origin of the web frontend's development server.
pub(crate) const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
pub(crate) const API_PREFIX: &str = "/api";
