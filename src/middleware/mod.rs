/// Middleware module
///
/// Access-token guard for the account routes. Request logging lives in
/// `crate::logger`.

mod jwt_middleware;

pub use jwt_middleware::JwtMiddleware;
