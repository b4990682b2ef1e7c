mod auth;
mod health_check;

pub use auth::{delete_account, get_account, login, logout, refresh, register, update_account};
pub use health_check::health_check;
