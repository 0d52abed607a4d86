mod request;
mod token;
mod user;

pub use request::{
    AuthResponse, LoginRequest, RegisterRequest, VoterAuthResponse, VoterLoginRequest,
};
#[cfg(test)]
pub use token::Bearer;
pub use token::{AuthToken, Claims};
pub use user::{Admin, Role, User};
