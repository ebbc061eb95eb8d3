//! Phone/OTP login.

mod flow;
mod machine;
mod phone;

pub use flow::{AuthFlow, AuthView};
pub use machine::{
    AuthCommand, AuthError, AuthErrorKind, AuthEvent, AuthMachine, AuthState, RequestId,
};
pub use phone::{
    COUNTRY_PREFIX, OTP_LENGTH, is_complete_otp, is_valid_phone, normalize_phone, sanitize_otp,
};
