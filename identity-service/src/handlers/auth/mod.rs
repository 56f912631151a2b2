pub mod password;
pub mod session;

pub use password::{change_password, forgot_password, reset_password};
pub use session::{refresh, sign_in, sign_out};
