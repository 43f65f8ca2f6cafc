use axum::{Router, routing::{get, post, put}};

use crate::AppState;

mod account;
mod clients;
mod extract;
mod jwt;
mod lockin;
mod login;
mod logout;
mod otp;
mod password;
mod password_reset;
mod signup;
mod social;
mod user;

pub use clients::{ClientProvider, Clients};
pub use extract::{AuthUser, SocketUser, bearer_token};
pub use jwt::{Claims, JwtKeys, TokenPair, TokenType};
pub use password::{hash_password, verify_password};
pub use social::{SocialProfile, complete_social_login};
pub use user::{Profile, User, UserType, create_user};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup::signup))
        .route("/signup/verify-otp", post(signup::verify_otp))
        .route("/choose-role", post(account::choose_role))
        .route("/login", post(login::login))
        .route("/token/refresh", post(logout::refresh))
        .route("/logout", post(logout::logout))
        .route("/profile", get(account::get_profile).put(account::update_profile))
        .route("/password-reset/request", post(password_reset::request_reset))
        .route("/password-reset/verify-otp", post(signup::verify_otp))
        .route("/password-reset/change", post(password_reset::change_after_reset))
        .route("/change-password", put(password_reset::change_password))
        .route("/google", post(social::google_login))
        .route("/social/{provider}/login", get(login::social_login))
        .route("/social/{provider}/callback", get(lockin::lockin))
}
